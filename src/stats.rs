use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{PeriodRecord, UserCycleProfile};

/// Gaps outside this band (in days) are treated as typos or skipped cycles.
pub const MIN_CYCLE_GAP: i64 = 18;
pub const MAX_CYCLE_GAP: i64 = 65;

/// How the kept samples are folded into an average.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Averaging {
    /// Plain arithmetic mean.
    #[default]
    Mean,
    /// Recency-weighted mean: the newest sample has weight 1, the next `factor`,
    /// then `factor^2` and so on.
    Decay { factor: f64 },
}

impl Averaging {
    /// Decay factors must lie in `(0, 1]` so the newest sample weighs most.
    pub fn is_valid(&self) -> bool {
        match *self {
            Averaging::Mean => true,
            Averaging::Decay { factor } => factor.is_finite() && factor > 0.0 && factor <= 1.0,
        }
    }

    /// `values` must be ordered newest first.
    fn average(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match *self {
            Averaging::Mean => Some(mean(values)),
            Averaging::Decay { factor } => {
                let mut weighted_sum = 0.0;
                let mut total_weight = 0.0;
                let mut weight = 1.0;
                for value in values {
                    weighted_sum += value * weight;
                    total_weight += weight;
                    weight *= factor;
                }
                (total_weight > 0.0).then(|| weighted_sum / total_weight)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CycleAverages {
    pub avg_cycle_length: Option<f64>,
    pub avg_period_length: Option<f64>,
}

/// Summary numbers for a stats view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub total_records: usize,
    pub avg_cycle_length: Option<f64>,
    pub avg_period_length: Option<f64>,
    pub shortest_cycle: Option<i64>,
    pub longest_cycle: Option<i64>,
    pub last_period_start: Option<NaiveDate>,
    pub last_period_duration: Option<u32>,
}

/// Collapse records sharing a start date (the later entry wins, as an update
/// would) and return them newest first.
fn dedup_newest_first(records: &[PeriodRecord]) -> Vec<(NaiveDate, u32)> {
    let mut by_start = BTreeMap::new();
    for record in records {
        by_start.insert(record.start_date, record.duration);
    }
    by_start.into_iter().rev().collect()
}

/// Day gaps between consecutive starts that fall inside the plausible band,
/// newest gap first.
pub fn cycle_gaps(records: &[PeriodRecord]) -> Vec<i64> {
    dedup_newest_first(records)
        .windows(2)
        .map(|w| (w[0].0 - w[1].0).num_days())
        .filter(|gap| (MIN_CYCLE_GAP..=MAX_CYCLE_GAP).contains(gap))
        .collect()
}

/// Learn average cycle and period lengths from an unordered history.
pub fn estimate(records: &[PeriodRecord], averaging: Averaging) -> CycleAverages {
    let samples = dedup_newest_first(records);

    let durations: Vec<f64> = samples.iter().map(|(_, d)| f64::from(*d)).collect();
    let avg_period_length = averaging.average(&durations);

    let avg_cycle_length = if samples.len() < 2 {
        None
    } else {
        let gaps: Vec<f64> = cycle_gaps(records).into_iter().map(|g| g as f64).collect();
        averaging.average(&gaps)
    };

    CycleAverages {
        avg_cycle_length,
        avg_period_length,
    }
}

pub fn cycle_stats(records: &[PeriodRecord], averaging: Averaging) -> CycleStats {
    let samples = dedup_newest_first(records);
    let averages = estimate(records, averaging);
    let gaps = cycle_gaps(records);

    CycleStats {
        total_records: samples.len(),
        avg_cycle_length: averages.avg_cycle_length,
        avg_period_length: averages.avg_period_length,
        shortest_cycle: gaps.iter().copied().min(),
        longest_cycle: gaps.iter().copied().max(),
        last_period_start: samples.first().map(|(start, _)| *start),
        last_period_duration: samples.first().map(|(_, duration)| *duration),
    }
}

impl UserCycleProfile {
    /// Re-derive the learned fields from the full record set.
    pub fn refresh(&mut self, records: &[PeriodRecord], averaging: Averaging) {
        let averages = estimate(records, averaging);
        self.avg_cycle_length = averages.avg_cycle_length;
        self.avg_period_length = averages.avg_period_length;
        self.last_period_date = records.iter().map(|r| r.start_date).max();

        tracing::debug!(
            records = records.len(),
            avg_cycle = ?self.avg_cycle_length,
            avg_period = ?self.avg_period_length,
            last_period = ?self.last_period_date,
            "profile averages recomputed"
        );
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_deviation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record(start: &str, duration: u32) -> PeriodRecord {
        PeriodRecord::new(day(start), duration)
    }

    #[test]
    fn no_records_means_no_averages() {
        let averages = estimate(&[], Averaging::Mean);
        assert_eq!(averages.avg_cycle_length, None);
        assert_eq!(averages.avg_period_length, None);
    }

    #[test]
    fn single_record_only_learns_period_length() {
        let averages = estimate(&[record("2024-03-01", 6)], Averaging::Mean);
        assert_eq!(averages.avg_cycle_length, None);
        assert_eq!(averages.avg_period_length, Some(6.0));
    }

    #[test]
    fn two_records_thirty_days_apart() {
        let records = vec![record("2024-01-01", 5), record("2024-01-31", 7)];
        let averages = estimate(&records, Averaging::Mean);
        assert_eq!(averages.avg_cycle_length, Some(30.0));
        assert_eq!(averages.avg_period_length, Some(6.0));
    }

    #[test]
    fn outlier_gaps_are_dropped() {
        // 40-day gap kept, 70-day gap dropped
        let records = vec![
            record("2024-01-01", 5),
            record("2024-03-11", 5),
            record("2024-04-20", 5),
        ];
        assert_eq!(cycle_gaps(&records), vec![40]);
        assert_eq!(
            estimate(&records, Averaging::Mean).avg_cycle_length,
            Some(40.0)
        );
    }

    #[test]
    fn all_gaps_filtered_leaves_cycle_unknown() {
        let records = vec![record("2024-01-01", 4), record("2024-01-11", 6)];
        let averages = estimate(&records, Averaging::Mean);
        assert_eq!(averages.avg_cycle_length, None);
        assert_eq!(averages.avg_period_length, Some(5.0));
    }

    #[test]
    fn duplicate_start_dates_count_once() {
        let records = vec![
            record("2024-01-01", 4),
            record("2024-01-29", 5),
            record("2024-01-29", 7),
        ];
        let averages = estimate(&records, Averaging::Mean);
        assert_eq!(averages.avg_cycle_length, Some(28.0));
        assert_eq!(averages.avg_period_length, Some(5.5));
    }

    #[test]
    fn decay_weights_recent_gaps_more() {
        // newest gap 30, older gap 26
        let records = vec![
            record("2024-01-01", 5),
            record("2024-01-27", 5),
            record("2024-02-26", 5),
        ];
        let decayed = estimate(&records, Averaging::Decay { factor: 0.75 })
            .avg_cycle_length
            .unwrap();
        let expected = (30.0 + 26.0 * 0.75) / 1.75;
        assert!((decayed - expected).abs() < 1e-9);
        assert!(decayed > 28.0);
    }

    #[test]
    fn stats_report_extremes_and_latest() {
        let records = vec![
            record("2024-03-26", 6),
            record("2024-01-01", 5),
            record("2024-01-27", 5),
            record("2024-02-26", 4),
        ];
        let stats = cycle_stats(&records, Averaging::Mean);
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.shortest_cycle, Some(26));
        assert_eq!(stats.longest_cycle, Some(30));
        assert_eq!(stats.last_period_start, Some(day("2024-03-26")));
        assert_eq!(stats.last_period_duration, Some(6));
    }

    #[test]
    fn refresh_tracks_latest_start() {
        let mut profile = UserCycleProfile::new(28, 5);
        let records = vec![record("2024-02-01", 5), record("2024-01-03", 5)];
        profile.refresh(&records, Averaging::Mean);
        assert_eq!(profile.last_period_date, Some(day("2024-02-01")));
        assert_eq!(profile.avg_cycle_length, Some(29.0));

        profile.refresh(&[], Averaging::Mean);
        assert_eq!(profile.last_period_date, None);
        assert_eq!(profile.avg_cycle_length, None);
        assert_eq!(profile.avg_period_length, None);
    }

    #[test]
    fn std_deviation_of_constant_series_is_zero() {
        assert_eq!(std_deviation(&[28.0, 28.0, 28.0]), 0.0);
        assert_eq!(std_deviation(&[28.0]), 0.0);
    }

    proptest! {
        #[test]
        fn estimate_ignores_input_order(
            offsets in proptest::collection::btree_set(0i64..400, 0..12),
            durations in proptest::collection::vec(2u32..=12, 12),
            rotate in 0usize..12,
        ) {
            let base = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
            let mut records: Vec<PeriodRecord> = offsets
                .iter()
                .zip(durations.iter())
                .map(|(off, d)| PeriodRecord::new(base + chrono::Duration::days(*off), *d))
                .collect();
            let forward = estimate(&records, Averaging::Mean);
            records.reverse();
            if !records.is_empty() {
                let n = rotate % records.len();
                records.rotate_left(n);
            }
            let shuffled = estimate(&records, Averaging::Mean);
            prop_assert_eq!(forward, shuffled);
        }
    }
}
