use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cycle::CycleBoundaries;
use crate::models::{Phase, UserCycleProfile};
use crate::phase::PhaseClassifier;

/// Where "today" sits relative to the expected cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DayStatus {
    pub today: NaiveDate,
    /// Keeps counting past the nominal cycle length while delayed.
    pub day_of_cycle: i64,
    pub days_delayed: i64,
    pub phase: Phase,
    pub expected_next_start: NaiveDate,
    /// Negative once the expected start has passed.
    pub days_until_next: i64,
    pub days_until_pms: Option<i64>,
}

impl DayStatus {
    pub fn is_delayed(&self) -> bool {
        self.days_delayed > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CycleStatus {
    /// No period has been logged yet.
    NoData,
    Tracking(DayStatus),
}

/// Compute today's position, switching to the delayed state once the
/// expected start has passed without a new record.
pub fn cycle_status(today: NaiveDate, profile: &UserCycleProfile) -> CycleStatus {
    let Some(last_start) = profile.last_period_date else {
        return CycleStatus::NoData;
    };

    let cycle_length = profile.cycle_length();
    let period_length = profile.period_length();
    let expected_next_start = last_start + Duration::days(cycle_length);
    let days_until_next = (expected_next_start - today).num_days();

    if today > expected_next_start {
        let days_delayed = (today - expected_next_start).num_days();
        return CycleStatus::Tracking(DayStatus {
            today,
            day_of_cycle: cycle_length + days_delayed,
            days_delayed,
            phase: Phase::Other,
            expected_next_start,
            days_until_next,
            days_until_pms: None,
        });
    }

    let classifier = PhaseClassifier::Prospective {
        last_start,
        cycle_length,
        period_length,
    };
    let (day_of_cycle, phase) = match classifier.locate(today) {
        Some(pos) => (pos.day_of_cycle, pos.phase),
        None => ((today - last_start).num_days() + 1, Phase::Other),
    };
    let pms_start = CycleBoundaries::new(cycle_length, period_length).pms_start_day;
    let days_until_pms = Some(pms_start - day_of_cycle).filter(|d| *d > 0);

    CycleStatus::Tracking(DayStatus {
        today,
        day_of_cycle,
        days_delayed: 0,
        phase,
        expected_next_start,
        days_until_next,
        days_until_pms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn profile(last: &str, avg_cycle: f64) -> UserCycleProfile {
        UserCycleProfile {
            default_cycle_length: 30,
            default_period_length: 5,
            last_period_date: Some(day(last)),
            avg_cycle_length: Some(avg_cycle),
            avg_period_length: Some(5.0),
        }
    }

    fn tracking(status: CycleStatus) -> DayStatus {
        match status {
            CycleStatus::Tracking(s) => s,
            CycleStatus::NoData => panic!("expected tracking status"),
        }
    }

    #[test]
    fn no_history_is_no_data() {
        let status = cycle_status(day("2024-01-01"), &UserCycleProfile::new(28, 5));
        assert_eq!(status, CycleStatus::NoData);
    }

    #[test]
    fn four_days_late() {
        let status = tracking(cycle_status(day("2024-02-02"), &profile("2024-01-01", 28.0)));
        assert_eq!(status.expected_next_start, day("2024-01-29"));
        assert_eq!(status.days_delayed, 4);
        assert_eq!(status.day_of_cycle, 32);
        assert_eq!(status.days_until_next, -4);
        assert!(status.is_delayed());
    }

    #[test]
    fn on_time_uses_normal_day_of_cycle() {
        let status = tracking(cycle_status(day("2024-01-10"), &profile("2024-01-01", 28.0)));
        assert_eq!(status.days_delayed, 0);
        assert_eq!(status.day_of_cycle, 10);
        assert_eq!(status.days_until_next, 19);
        assert_eq!(status.days_until_pms, Some(14));
        assert_eq!(status.phase, Phase::Fertile);
    }

    #[test]
    fn expected_day_itself_is_not_late() {
        let status = tracking(cycle_status(day("2024-01-29"), &profile("2024-01-01", 28.0)));
        assert_eq!(status.days_delayed, 0);
        assert_eq!(status.day_of_cycle, 1);
        assert_eq!(status.days_until_next, 0);
        assert_eq!(status.phase, Phase::Period);
    }

    #[test]
    fn rounds_learned_average() {
        let status = tracking(cycle_status(day("2024-02-02"), &profile("2024-01-01", 29.6)));
        assert_eq!(status.expected_next_start, day("2024-01-31"));
        assert_eq!(status.days_delayed, 2);
        assert_eq!(status.day_of_cycle, 32);
    }

    #[test]
    fn inside_pms_has_no_countdown() {
        let status = tracking(cycle_status(day("2024-01-26"), &profile("2024-01-01", 28.0)));
        assert_eq!(status.phase, Phase::Pms);
        assert_eq!(status.days_until_pms, None);
    }
}
