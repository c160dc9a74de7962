use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cycle::CycleBoundaries;
use crate::models::{PeriodRecord, UserCycleProfile};
use crate::stats::{cycle_gaps, mean, std_deviation};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub predicted_start: NaiveDate,
    pub predicted_end: NaiveDate,
    pub confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertilityWindow {
    pub fertile_start: NaiveDate,
    pub fertile_end: NaiveDate,
    pub ovulation_day: NaiveDate,
    pub pms_start: NaiveDate,
}

/// Last known start plus the effective cycle length.
pub fn expected_next_start(profile: &UserCycleProfile) -> Option<NaiveDate> {
    let last = profile.last_period_date?;
    Some(last + Duration::days(profile.cycle_length()))
}

/// Predict the next period from the profile, with a confidence derived from
/// how regular the recorded cycles have been.
pub fn predict(profile: &UserCycleProfile, records: &[PeriodRecord]) -> Option<Prediction> {
    let predicted_start = expected_next_start(profile)?;
    let predicted_end = predicted_start + Duration::days((profile.period_length() - 1).max(0));

    let gaps: Vec<f64> = cycle_gaps(records).into_iter().map(|g| g as f64).collect();
    let confidence = if gaps.len() < 2 {
        0.5
    } else {
        (1.0 - (std_deviation(&gaps) / mean(&gaps)) as f32).clamp(0.1, 0.95)
    };

    Some(Prediction {
        predicted_start,
        predicted_end,
        confidence,
    })
}

/// Fertile window and PMS start of the cycle beginning at the last known start.
pub fn fertility_window(profile: &UserCycleProfile) -> Option<FertilityWindow> {
    let cycle_start = profile.last_period_date?;
    let bounds = CycleBoundaries::new(profile.cycle_length(), profile.period_length());
    let on_day = |day: i64| cycle_start + Duration::days(day - 1);

    Some(FertilityWindow {
        fertile_start: on_day(bounds.fertile_start),
        fertile_end: on_day(bounds.fertile_end),
        ovulation_day: on_day(bounds.ovulation_day),
        pms_start: on_day(bounds.pms_start_day),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Averaging;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn profile_from(records: &[PeriodRecord]) -> UserCycleProfile {
        let mut profile = UserCycleProfile::new(28, 5);
        profile.refresh(records, Averaging::Mean);
        profile
    }

    #[test]
    fn no_prediction_without_history() {
        let profile = UserCycleProfile::new(28, 5);
        assert!(predict(&profile, &[]).is_none());
        assert!(fertility_window(&profile).is_none());
    }

    #[test]
    fn single_record_predicts_from_defaults() {
        let records = vec![PeriodRecord::new(day("2026-01-01"), 5)];
        let pred = predict(&profile_from(&records), &records).unwrap();
        assert_eq!(pred.predicted_start, day("2026-01-29"));
        assert_eq!(pred.predicted_end, day("2026-02-02"));
        assert_eq!(pred.confidence, 0.5);
    }

    #[test]
    fn regular_cycles_are_confident() {
        let records = vec![
            PeriodRecord::new(day("2026-01-01"), 5),
            PeriodRecord::new(day("2026-01-29"), 5),
            PeriodRecord::new(day("2026-02-26"), 5),
        ];
        let pred = predict(&profile_from(&records), &records).unwrap();
        assert_eq!(pred.predicted_start, day("2026-03-26"));
        assert_eq!(pred.confidence, 0.95);
    }

    #[test]
    fn fertility_window_calculated() {
        let records = vec![
            PeriodRecord::new(day("2026-01-01"), 5),
            PeriodRecord::new(day("2026-01-29"), 5),
        ];
        let fw = fertility_window(&profile_from(&records)).unwrap();
        // day 14 of the cycle starting Jan 29
        assert_eq!(fw.ovulation_day, day("2026-02-11"));
        assert_eq!(fw.fertile_start, day("2026-02-06"));
        assert_eq!(fw.fertile_end, day("2026-02-13"));
        assert_eq!(fw.pms_start, day("2026-02-21"));
    }
}
