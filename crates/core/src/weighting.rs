//! Candidate scoring for the selection engine.
//!
//! A candidate's weight multiplies three terms:
//!
//! * recency gap: seconds since the learner last touched the question, divided
//!   by how often they got it right,
//! * spacing factor: an oscillating envelope that peaks near review-period
//!   boundaries,
//! * level fit: a Gaussian centred on the learner's target level.
//!
//! Questions never answered correctly have no weight of their own and get a
//! fill weight derived from the others.

use std::f64::consts::PI;

use chrono::{DateTime, Duration, Utc};

use crate::model::{AnswerRecord, AnswerState, Question};

/// Floor added to the spacing factor so no candidate drops to exactly zero.
pub const SPACING_FLOOR: f64 = 1e-6;

/// `|cos(π · log2(p + 4))| ^ ((p + 4)² / 20) + ε`
#[must_use]
pub fn spacing_factor(periods_elapsed: f64) -> f64 {
    let p = periods_elapsed.max(0.0) + 4.0;
    let base = (PI * p.log2()).cos().abs();
    base.powf(p * p / 20.0) + SPACING_FLOOR
}

/// `exp(-0.5 · (target - level)²)`
#[must_use]
pub fn level_fit(target_level: f64, question_level: f64) -> f64 {
    let diff = target_level - question_level;
    (-0.5 * diff * diff).exp()
}

/// What the weight function needs to know about one learner/question pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CandidateHistory {
    pub correct_count: u32,
    /// Most recent record that was answered correctly or is still awaiting an answer.
    pub last_touched: Option<DateTime<Utc>>,
    /// Earliest record for the pair.
    pub first_seen: Option<DateTime<Utc>>,
}

impl CandidateHistory {
    /// Summarises `records`. Records for other questions are skipped.
    #[must_use]
    pub fn from_records<'a>(
        question: &Question,
        records: impl IntoIterator<Item = &'a AnswerRecord>,
    ) -> Self {
        let mut history = Self::default();
        for record in records {
            if record.question_id != question.id() {
                continue;
            }
            let correct = record.is_correct_for(question);
            if correct {
                history.correct_count = history.correct_count.saturating_add(1);
            }
            if correct || record.state != AnswerState::Answered {
                history.last_touched = Some(
                    history
                        .last_touched
                        .map_or(record.scheduled_at, |t| t.max(record.scheduled_at)),
                );
            }
            history.first_seen = Some(
                history
                    .first_seen
                    .map_or(record.scheduled_at, |t| t.min(record.scheduled_at)),
            );
        }
        history
    }
}

/// Weight of a candidate, or `None` when it was never answered correctly.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn candidate_weight(
    history: &CandidateHistory,
    target_level: u32,
    question_level: u32,
    now: DateTime<Utc>,
    review_period: Duration,
) -> Option<f64> {
    if history.correct_count == 0 {
        return None;
    }

    let last = history.last_touched.unwrap_or(now);
    let gap_secs = (now - last).num_milliseconds().max(0) as f64 / 1000.0;
    let recency_gap = gap_secs / f64::from(history.correct_count);

    let first = history.first_seen.unwrap_or(now);
    let period_ms = review_period.num_milliseconds().max(1) as f64;
    let periods_elapsed = (now - first).num_milliseconds().max(0) as f64 / period_ms;

    let weight = recency_gap
        * spacing_factor(periods_elapsed)
        * level_fit(f64::from(target_level), f64::from(question_level));

    Some(if weight.is_finite() { weight.max(0.0) } else { 0.0 })
}

/// Replaces undefined weights with the fill weight
/// `(Σ defined + undefined · max(defined)) / total`.
///
/// With no defined weight at all every candidate gets `1`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fill_undefined(weights: &[Option<f64>]) -> Vec<f64> {
    let defined: Vec<f64> = weights.iter().flatten().copied().collect();
    if defined.is_empty() {
        return vec![1.0; weights.len()];
    }

    let undefined = weights.len() - defined.len();
    let sum: f64 = defined.iter().sum();
    let max = defined.iter().copied().fold(0.0_f64, f64::max);
    let fill = (sum + undefined as f64 * max) / weights.len() as f64;

    weights.iter().map(|w| w.unwrap_or(fill)).collect()
}

/// Scales weights to sum to one.
///
/// Negative and non-finite entries count as zero. If nothing positive remains
/// the result is uniform.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn normalize(weights: &[f64]) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let cleaned: Vec<f64> = weights
        .iter()
        .map(|w| if w.is_finite() && *w > 0.0 { *w } else { 0.0 })
        .collect();
    let total: f64 = cleaned.iter().sum();

    if total.is_finite() && total > 0.0 {
        cleaned.into_iter().map(|w| w / total).collect()
    } else {
        let uniform = 1.0 / weights.len() as f64;
        vec![uniform; weights.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupId, LearnerId, QuestionContent, QuestionId, RecordId};
    use crate::time::fixed_now;

    fn question() -> Question {
        Question::new(
            QuestionId::new(1),
            [GroupId::new(1)],
            3,
            QuestionContent::text_only("Q"),
            "a",
        )
        .unwrap()
    }

    fn record(id: u64, at: DateTime<Utc>, state: AnswerState, answer: Option<&str>) -> AnswerRecord {
        let mut r = AnswerRecord::pending(RecordId::new(id), QuestionId::new(1), LearnerId::new(1), at);
        r.state = state;
        r.submitted_answer = answer.map(str::to_string);
        r
    }

    #[test]
    fn spacing_factor_peaks_at_start_and_stays_positive() {
        let at_start = spacing_factor(0.0);
        assert!((at_start - (1.0 + SPACING_FLOOR)).abs() < 1e-12);

        for i in 0..200 {
            let v = spacing_factor(f64::from(i) * 0.37);
            assert!(v >= SPACING_FLOOR);
            assert!(v <= 1.0 + SPACING_FLOOR);
        }
    }

    #[test]
    fn level_fit_is_gaussian() {
        assert_eq!(level_fit(3.0, 3.0), 1.0);
        assert!((level_fit(4.0, 3.0) - (-0.5_f64).exp()).abs() < 1e-12);
        assert!(level_fit(10.0, 1.0) < 1e-10);
    }

    #[test]
    fn history_tracks_correct_count_and_touch_times() {
        let now = fixed_now();
        let q = question();
        let records = vec![
            record(1, now - Duration::days(5), AnswerState::Answered, Some("a")),
            record(2, now - Duration::days(3), AnswerState::Answered, Some("b")),
            record(3, now - Duration::days(2), AnswerState::Answered, Some("a")),
        ];

        let history = CandidateHistory::from_records(&q, &records);
        assert_eq!(history.correct_count, 2);
        assert_eq!(history.last_touched, Some(now - Duration::days(2)));
        assert_eq!(history.first_seen, Some(now - Duration::days(5)));
    }

    #[test]
    fn never_correct_has_no_weight() {
        let history = CandidateHistory::default();
        assert!(candidate_weight(&history, 3, 3, fixed_now(), Duration::days(1)).is_none());
    }

    #[test]
    fn staler_questions_weigh_more() {
        let now = fixed_now();
        let recent = CandidateHistory {
            correct_count: 1,
            last_touched: Some(now - Duration::hours(1)),
            first_seen: Some(now),
        };
        let stale = CandidateHistory {
            last_touched: Some(now - Duration::hours(10)),
            ..recent
        };

        let w_recent = candidate_weight(&recent, 3, 3, now, Duration::days(1)).unwrap();
        let w_stale = candidate_weight(&stale, 3, 3, now, Duration::days(1)).unwrap();
        assert!(w_stale > w_recent);
    }

    #[test]
    fn future_pending_record_clamps_gap_to_zero() {
        let now = fixed_now();
        let history = CandidateHistory {
            correct_count: 1,
            last_touched: Some(now + Duration::days(2)),
            first_seen: Some(now - Duration::days(1)),
        };
        assert_eq!(
            candidate_weight(&history, 3, 3, now, Duration::days(1)),
            Some(0.0)
        );
    }

    #[test]
    fn fill_uses_sum_and_max_of_defined() {
        let filled = fill_undefined(&[Some(2.0), None, Some(4.0), None]);
        // (6 + 2 * 4) / 4
        assert_eq!(filled, vec![2.0, 3.5, 4.0, 3.5]);
    }

    #[test]
    fn fill_without_defined_weights_is_uniform() {
        assert_eq!(fill_undefined(&[None, None, None]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn normalized_weights_sum_to_one() {
        let cases: [&[f64]; 4] = [
            &[1.0, 2.0, 3.0],
            &[0.0, 0.0],
            &[f64::NAN, 1.0],
            &[-1.0, f64::INFINITY, 0.0],
        ];
        for weights in cases {
            let normalized = normalize(weights);
            let sum: f64 = normalized.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9, "{weights:?} -> {normalized:?}");
            assert!(normalized.iter().all(|w| w.is_finite()));
        }
        assert!(normalize(&[]).is_empty());
    }
}
