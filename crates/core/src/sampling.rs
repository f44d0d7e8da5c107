//! Random draws used by selection and the planner.

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Draws up to `amount` distinct indices, each draw proportional to the
/// remaining weights.
///
/// Non-finite and negative weights count as zero. When every remaining weight
/// is zero the draw falls back to uniform.
pub fn sample_weighted_indices<R: Rng + ?Sized>(
    weights: &[f64],
    amount: usize,
    rng: &mut R,
) -> Vec<usize> {
    let mut remaining: Vec<(usize, f64)> = weights
        .iter()
        .enumerate()
        .map(|(i, w)| (i, if w.is_finite() && *w > 0.0 { *w } else { 0.0 }))
        .collect();
    let amount = amount.min(remaining.len());
    let mut picked = Vec::with_capacity(amount);

    while picked.len() < amount {
        let total: f64 = remaining.iter().map(|(_, w)| w).sum();
        let position = if total > 0.0 && total.is_finite() {
            pick_by_weight(&remaining, rng.random::<f64>() * total)
        } else {
            rng.random_range(0..remaining.len())
        };
        let (index, _) = remaining.remove(position);
        picked.push(index);
    }

    picked
}

fn pick_by_weight(remaining: &[(usize, f64)], target: f64) -> usize {
    let mut cumulative = 0.0;
    let mut last_positive = 0;
    for (position, (_, weight)) in remaining.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = position;
        if target < cumulative {
            return position;
        }
    }
    // Rounding can leave `target` a hair above the final cumulative sum.
    last_positive
}

/// Level drawn from a half-normal around `mean`, rounded and at least 1.
///
/// The first sample is kept when it lands at or below `mean`; otherwise a
/// second independent sample is used as is. A non-positive or non-finite
/// `spread` yields `mean` itself.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn half_normal_level<R: Rng + ?Sized>(mean: f64, spread: f64, rng: &mut R) -> u32 {
    let value = match Normal::new(mean, spread) {
        Ok(normal) if spread > 0.0 => {
            let first = normal.sample(rng);
            if first > mean {
                normal.sample(rng)
            } else {
                first
            }
        }
        _ => mean,
    };

    let rounded = value.round();
    if !rounded.is_finite() || rounded < 1.0 {
        1
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn draws_distinct_indices_up_to_amount() {
        let mut rng = StdRng::seed_from_u64(7);
        let weights = [0.1, 0.4, 0.2, 0.3];

        let picked = sample_weighted_indices(&weights, 3, &mut rng);
        assert_eq!(picked.len(), 3);
        let mut sorted = picked.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 3);
    }

    #[test]
    fn amount_is_clamped_to_population() {
        let mut rng = StdRng::seed_from_u64(1);
        let picked = sample_weighted_indices(&[1.0, 1.0], 5, &mut rng);
        assert_eq!(picked.len(), 2);
        assert!(sample_weighted_indices(&[], 3, &mut rng).is_empty());
    }

    #[test]
    fn zero_weight_entries_come_last() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let picked = sample_weighted_indices(&[0.0, 5.0, 0.0, 1.0], 2, &mut rng);
            let mut sorted = picked.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![1, 3]);
        }
    }

    #[test]
    fn all_zero_weights_still_draw() {
        let mut rng = StdRng::seed_from_u64(3);
        let picked = sample_weighted_indices(&[0.0, f64::NAN, -1.0], 3, &mut rng);
        let mut sorted = picked;
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn heavier_weight_wins_more_often() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut heavy = 0;
        for _ in 0..1_000 {
            if sample_weighted_indices(&[1.0, 9.0], 1, &mut rng) == vec![1] {
                heavy += 1;
            }
        }
        assert!(heavy > 800, "heavy picked {heavy} times");
    }

    #[test]
    fn half_normal_never_goes_below_one() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..500 {
            assert!(half_normal_level(1.0, 3.0, &mut rng) >= 1);
        }
    }

    #[test]
    fn half_normal_favours_levels_at_or_below_mean() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut at_or_below = 0;
        for _ in 0..1_000 {
            if half_normal_level(6.0, 1.0, &mut rng) <= 6 {
                at_or_below += 1;
            }
        }
        // P(≤ mean) = 0.5 + 0.5 · 0.5 before rounding
        assert!(at_or_below > 650, "at_or_below = {at_or_below}");
    }

    #[test]
    fn degenerate_spread_returns_mean() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(half_normal_level(4.0, 0.0, &mut rng), 4);
        assert_eq!(half_normal_level(4.4, f64::NAN, &mut rng), 4);
        assert_eq!(half_normal_level(-3.0, 0.0, &mut rng), 1);
    }
}
