use chrono::{Duration, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Upper bound for a single repetition gap (about 100 years).
const MAX_INTERVAL_SECS: f64 = 100.0 * 365.0 * SECONDS_PER_DAY;

const DEFAULT_REVIEW_PERIOD_SECS: i64 = 86_400;
const DEFAULT_LEVEL_SPREAD: f64 = 1.0;
const DEFAULT_DELIVERY_TIMEOUT_SECS: i64 = 30;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("setting `{0}` is required")]
    Missing(&'static str),
    #[error("setting `{field}` must be positive, got {value}")]
    NonPositive { field: &'static str, value: i64 },
    #[error("from_time and to_time must be set together")]
    IncompleteWindow,
    #[error("week_days must not be empty when set")]
    EmptyWeekDays,
    #[error("level_spread must be finite and non-negative, got {0}")]
    InvalidSpread(f64),
    #[error("unknown dispatch order: {0}")]
    UnknownOrder(String),
    #[error("unknown distribution function: {0}")]
    UnknownDistribution(String),
}

//
// ─── DISPATCH ORDER ────────────────────────────────────────────────────────────
//

/// When the interval timer restarts relative to a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOrder {
    /// The timer restarts as soon as the interval gate opens, even if the
    /// weekday gate then blocks the dispatch.
    IntervalFirst,
    /// The timer restarts only after a dispatch round ran.
    ActionFirst,
}

impl DispatchOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DispatchOrder::IntervalFirst => "interval-first",
            DispatchOrder::ActionFirst => "action-first",
        }
    }
}

impl FromStr for DispatchOrder {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interval-first" => Ok(Self::IntervalFirst),
            "action-first" => Ok(Self::ActionFirst),
            other => Err(SettingsError::UnknownOrder(other.to_string())),
        }
    }
}

//
// ─── DISTRIBUTION FUNCTION ─────────────────────────────────────────────────────
//

/// Maps a repetition index to the gap (in days) before the next review.
///
/// All variants grow monotonically, so every successful repetition pushes the
/// next one further out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistributionFunction {
    /// `e^k` days.
    Exponential,
    /// `2^k` days.
    Doubling,
    /// `k + 1` days.
    Linear,
}

impl DistributionFunction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DistributionFunction::Exponential => "exponential",
            DistributionFunction::Doubling => "doubling",
            DistributionFunction::Linear => "linear",
        }
    }

    #[must_use]
    pub fn days(self, repetition: u32) -> f64 {
        let k = f64::from(repetition);
        match self {
            DistributionFunction::Exponential => k.exp(),
            DistributionFunction::Doubling => k.exp2(),
            DistributionFunction::Linear => k + 1.0,
        }
    }

    /// Gap for the given repetition index as a duration, capped at ~100 years.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn interval(self, repetition: u32) -> Duration {
        let secs = (self.days(repetition) * SECONDS_PER_DAY).clamp(0.0, MAX_INTERVAL_SECS);
        Duration::seconds(secs.round() as i64)
    }
}

impl FromStr for DistributionFunction {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exponential" | "exp" => Ok(Self::Exponential),
            "doubling" => Ok(Self::Doubling),
            "linear" => Ok(Self::Linear),
            other => Err(SettingsError::UnknownDistribution(other.to_string())),
        }
    }
}

//
// ─── TIME WINDOW ───────────────────────────────────────────────────────────────
//

/// Daily window in local time during which dispatching is allowed.
///
/// Both bounds are inclusive. A window whose start is after its end wraps
/// past midnight (e.g. 22:00–06:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    from: NaiveTime,
    to: NaiveTime,
}

impl TimeWindow {
    #[must_use]
    pub fn new(from: NaiveTime, to: NaiveTime) -> Self {
        Self { from, to }
    }

    #[must_use]
    pub fn from(&self) -> NaiveTime {
        self.from
    }

    #[must_use]
    pub fn to(&self) -> NaiveTime {
        self.to
    }

    #[must_use]
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.from <= self.to {
            self.from <= time && time <= self.to
        } else {
            time >= self.from || time <= self.to
        }
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Validated scheduling configuration shared by the planner and the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSettings {
    every: Duration,
    order: DispatchOrder,
    week_days: Option<Vec<Weekday>>,
    window: Option<TimeWindow>,
    review_period: Duration,
    repetition_cap: u32,
    distribution: DistributionFunction,
    level_spread: f64,
    delivery_timeout: Duration,
}

/// Unvalidated settings as they come from storage or an editor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleSettingsDraft {
    pub time_period_secs: Option<i64>,
    pub order: Option<DispatchOrder>,
    pub week_days: Option<Vec<Weekday>>,
    pub from_time: Option<NaiveTime>,
    pub to_time: Option<NaiveTime>,
    pub review_period_secs: Option<i64>,
    pub repetition_amount: Option<u32>,
    pub distribution_function: Option<DistributionFunction>,
    pub level_spread: Option<f64>,
    pub delivery_timeout_secs: Option<i64>,
}

impl ScheduleSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings used when seeding a fresh database: hourly dispatch, exponential
    /// backoff, six repetitions before a question counts as mastered.
    #[must_use]
    pub fn recommended() -> Self {
        Self {
            time_period_secs: Some(3_600),
            order: Some(DispatchOrder::IntervalFirst),
            week_days: None,
            from_time: None,
            to_time: None,
            review_period_secs: Some(DEFAULT_REVIEW_PERIOD_SECS),
            repetition_amount: Some(6),
            distribution_function: Some(DistributionFunction::Exponential),
            level_spread: Some(DEFAULT_LEVEL_SPREAD),
            delivery_timeout_secs: Some(DEFAULT_DELIVERY_TIMEOUT_SECS),
        }
    }

    /// Validate the draft into usable settings.
    ///
    /// `time_period`, `order`, `repetition_amount` and `distribution_function`
    /// are required; the rest fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` for missing required fields or invalid values.
    pub fn validate(self) -> Result<ScheduleSettings, SettingsError> {
        let every_secs = self
            .time_period_secs
            .ok_or(SettingsError::Missing("time_period"))?;
        let order = self.order.ok_or(SettingsError::Missing("order"))?;
        let repetition_cap = self
            .repetition_amount
            .ok_or(SettingsError::Missing("repetition_amount"))?;
        let distribution = self
            .distribution_function
            .ok_or(SettingsError::Missing("distribution_function"))?;

        let every = positive_secs("time_period", every_secs)?;
        let review_period = positive_secs(
            "review_period",
            self.review_period_secs.unwrap_or(DEFAULT_REVIEW_PERIOD_SECS),
        )?;
        let delivery_timeout = positive_secs(
            "delivery_timeout",
            self.delivery_timeout_secs
                .unwrap_or(DEFAULT_DELIVERY_TIMEOUT_SECS),
        )?;
        if repetition_cap == 0 {
            return Err(SettingsError::NonPositive {
                field: "repetition_amount",
                value: 0,
            });
        }

        let level_spread = self.level_spread.unwrap_or(DEFAULT_LEVEL_SPREAD);
        if !level_spread.is_finite() || level_spread < 0.0 {
            return Err(SettingsError::InvalidSpread(level_spread));
        }

        let window = match (self.from_time, self.to_time) {
            (Some(from), Some(to)) => Some(TimeWindow::new(from, to)),
            (None, None) => None,
            _ => return Err(SettingsError::IncompleteWindow),
        };

        let week_days = match self.week_days {
            Some(mut days) => {
                if days.is_empty() {
                    return Err(SettingsError::EmptyWeekDays);
                }
                days.sort_by_key(Weekday::num_days_from_monday);
                days.dedup();
                Some(days)
            }
            None => None,
        };

        Ok(ScheduleSettings {
            every,
            order,
            week_days,
            window,
            review_period,
            repetition_cap,
            distribution,
            level_spread,
            delivery_timeout,
        })
    }
}

fn positive_secs(field: &'static str, value: i64) -> Result<Duration, SettingsError> {
    if value <= 0 {
        return Err(SettingsError::NonPositive { field, value });
    }
    Duration::try_seconds(value).ok_or(SettingsError::NonPositive { field, value })
}

impl ScheduleSettings {
    /// Rehydrate settings from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the stored values no longer validate.
    pub fn from_persisted(draft: ScheduleSettingsDraft) -> Result<Self, SettingsError> {
        draft.validate()
    }

    /// Back to an editable draft.
    #[must_use]
    pub fn to_draft(&self) -> ScheduleSettingsDraft {
        ScheduleSettingsDraft {
            time_period_secs: Some(self.every.num_seconds()),
            order: Some(self.order),
            week_days: self.week_days.clone(),
            from_time: self.window.map(|w| w.from()),
            to_time: self.window.map(|w| w.to()),
            review_period_secs: Some(self.review_period.num_seconds()),
            repetition_amount: Some(self.repetition_cap),
            distribution_function: Some(self.distribution),
            level_spread: Some(self.level_spread),
            delivery_timeout_secs: Some(self.delivery_timeout.num_seconds()),
        }
    }

    #[must_use]
    pub fn every(&self) -> Duration {
        self.every
    }

    #[must_use]
    pub fn order(&self) -> DispatchOrder {
        self.order
    }

    #[must_use]
    pub fn week_days(&self) -> Option<&[Weekday]> {
        self.week_days.as_deref()
    }

    #[must_use]
    pub fn window(&self) -> Option<TimeWindow> {
        self.window
    }

    #[must_use]
    pub fn review_period(&self) -> Duration {
        self.review_period
    }

    #[must_use]
    pub fn repetition_cap(&self) -> u32 {
        self.repetition_cap
    }

    #[must_use]
    pub fn distribution(&self) -> DistributionFunction {
        self.distribution
    }

    #[must_use]
    pub fn level_spread(&self) -> f64 {
        self.level_spread
    }

    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Trailing window in which recently asked questions are avoided by the
    /// fresh-question search.
    #[must_use]
    pub fn lookback(&self) -> Duration {
        self.distribution.interval(self.repetition_cap)
    }
}
