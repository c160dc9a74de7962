//! Day boundaries of the phases inside a single cycle.
//!
//! All day numbers are 1-indexed: day 1 is the first day of the period. The
//! luteal phase is fixed at 14 days, so ovulation is counted back from the
//! end of the cycle rather than forward from its start.

use serde::{Deserialize, Serialize};

use crate::models::Phase;

pub const LUTEAL_PHASE_DAYS: i64 = 14;
/// Fertile window opens this many days before ovulation...
pub const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
/// ...and closes this many days after it.
pub const FERTILE_DAYS_AFTER_OVULATION: i64 = 2;
/// PMS starts this many days before the cycle's last day.
pub const PMS_DAYS_BEFORE_END: i64 = 4;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CycleBoundaries {
    pub period_end_day: i64,
    pub fertile_start: i64,
    pub fertile_end: i64,
    pub ovulation_day: i64,
    pub pms_start_day: i64,
    pub cycle_length: i64,
}

impl CycleBoundaries {
    /// Lengths are taken as given; range checks belong to the input layer.
    pub fn new(cycle_length: i64, period_length: i64) -> Self {
        let ovulation_day = cycle_length - LUTEAL_PHASE_DAYS;
        Self {
            period_end_day: period_length,
            fertile_start: (ovulation_day - FERTILE_DAYS_BEFORE_OVULATION).max(1),
            fertile_end: ovulation_day + FERTILE_DAYS_AFTER_OVULATION,
            ovulation_day,
            pms_start_day: cycle_length - PMS_DAYS_BEFORE_END,
            cycle_length,
        }
    }

    pub fn in_fertile_window(&self, day: i64) -> bool {
        (self.fertile_start..=self.fertile_end).contains(&day)
    }

    /// Classify a day number, checking phases in priority order.
    ///
    /// With `period_known == false` the period check is skipped entirely; this
    /// is how extrapolated cycles with no recorded bleed are handled.
    pub fn phase_of(&self, day: i64, period_known: bool) -> Phase {
        if period_known && day >= 1 && day <= self.period_end_day {
            return Phase::Period;
        }
        if self.in_fertile_window(day) {
            if day == self.ovulation_day {
                return Phase::Ovulation;
            }
            return Phase::Fertile;
        }
        if day >= self.pms_start_day && day <= self.cycle_length {
            return Phase::Pms;
        }
        Phase::Other
    }
}
