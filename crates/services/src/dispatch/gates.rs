use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use quiz_core::model::{DispatchOrder, ScheduleSettings};

/// Why a tick did or did not dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    OutsideWindow,
    IntervalPending,
    WrongWeekday,
    Open,
}

/// Interval bookkeeping carried between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateState {
    previous_call: Option<DateTime<Utc>>,
}

impl GateState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn previous_call(&self) -> Option<DateTime<Utc>> {
        self.previous_call
    }

    /// Run the time window, interval and weekday gates in that order.
    ///
    /// `local` is the wall-clock reading of `now` used for the window and
    /// weekday checks. With `IntervalFirst` the interval timer restarts as
    /// soon as the interval gate passes, even if the weekday gate then fails.
    pub fn evaluate(
        &mut self,
        settings: &ScheduleSettings,
        now: DateTime<Utc>,
        local: NaiveDateTime,
    ) -> GateDecision {
        if let Some(window) = settings.window() {
            if !window.contains(local.time()) {
                return GateDecision::OutsideWindow;
            }
        }

        if let Some(previous) = self.previous_call {
            let next = previous
                .checked_add_signed(settings.every())
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            if now < next {
                return GateDecision::IntervalPending;
            }
        }

        if settings.order() == DispatchOrder::IntervalFirst {
            self.previous_call = Some(now);
        }

        if let Some(days) = settings.week_days() {
            if !days.contains(&local.weekday()) {
                return GateDecision::WrongWeekday;
            }
        }

        GateDecision::Open
    }

    /// Restart the interval timer after a dispatch round.
    pub fn record_round(&mut self, now: DateTime<Utc>) {
        self.previous_call = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, NaiveTime, Weekday};
    use quiz_core::model::ScheduleSettingsDraft;
    use quiz_core::time::{fixed_now, to_local};

    fn utc(now: DateTime<Utc>) -> NaiveDateTime {
        to_local(now, FixedOffset::east_opt(0).unwrap())
    }

    fn settings(order: DispatchOrder, days: Option<Vec<Weekday>>) -> ScheduleSettings {
        let mut draft = ScheduleSettingsDraft::recommended();
        draft.time_period_secs = Some(60);
        draft.order = Some(order);
        draft.week_days = days;
        draft.validate().unwrap()
    }

    #[test]
    fn window_gate_runs_first() {
        // fixed_now is 22:13 UTC.
        let mut draft = ScheduleSettingsDraft::recommended();
        draft.from_time = NaiveTime::from_hms_opt(8, 0, 0);
        draft.to_time = NaiveTime::from_hms_opt(20, 0, 0);
        let settings = draft.validate().unwrap();

        let mut state = GateState::new();
        let now = fixed_now();
        assert_eq!(state.evaluate(&settings, now, utc(now)), GateDecision::OutsideWindow);
        assert_eq!(state.previous_call(), None);
    }

    #[test]
    fn interval_first_restarts_timer_on_wrong_weekday() {
        // fixed_now is a Tuesday.
        let settings = settings(DispatchOrder::IntervalFirst, Some(vec![Weekday::Mon]));
        let mut state = GateState::new();
        let now = fixed_now();

        assert_eq!(state.evaluate(&settings, now, utc(now)), GateDecision::WrongWeekday);
        assert_eq!(state.previous_call(), Some(now));

        let soon = now + Duration::seconds(30);
        assert_eq!(
            state.evaluate(&settings, soon, utc(soon)),
            GateDecision::IntervalPending
        );
    }

    #[test]
    fn action_first_keeps_timer_until_a_round_runs() {
        let settings = settings(DispatchOrder::ActionFirst, Some(vec![Weekday::Mon]));
        let mut state = GateState::new();
        let now = fixed_now();

        assert_eq!(state.evaluate(&settings, now, utc(now)), GateDecision::WrongWeekday);
        assert_eq!(state.previous_call(), None);

        let open = settings_open(DispatchOrder::ActionFirst);
        assert_eq!(state.evaluate(&open, now, utc(now)), GateDecision::Open);
        state.record_round(now);

        let later = now + Duration::seconds(59);
        assert_eq!(
            state.evaluate(&open, later, utc(later)),
            GateDecision::IntervalPending
        );
        let due = now + Duration::seconds(60);
        assert_eq!(state.evaluate(&open, due, utc(due)), GateDecision::Open);
    }

    fn settings_open(order: DispatchOrder) -> ScheduleSettings {
        settings(order, None)
    }
}
