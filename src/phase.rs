//! Mapping calendar dates onto cycle phases.
//!
//! Two strategies share one interface. `Prospective` assumes every cycle has
//! the learned length and projects from the latest known start. `Retrospective`
//! walks the recorded starts and uses each real cycle's actual length, which
//! is only possible for dates that already have a later recorded start.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cycle::CycleBoundaries;
use crate::models::{PeriodRecord, Phase, UserCycleProfile};

/// Where a date sits inside the cycle that encloses it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CyclePosition {
    pub cycle_start: NaiveDate,
    pub cycle_length: i64,
    pub day_of_cycle: i64,
    pub phase: Phase,
}

impl CyclePosition {
    fn resolve(
        date: NaiveDate,
        cycle_start: NaiveDate,
        cycle_length: i64,
        period_length: i64,
    ) -> Self {
        let day_of_cycle = (date - cycle_start).num_days() + 1;
        let phase = CycleBoundaries::new(cycle_length, period_length)
            .phase_of(day_of_cycle, period_length > 0);
        Self {
            cycle_start,
            cycle_length,
            day_of_cycle,
            phase,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum PhaseClassifier<'a> {
    Prospective {
        last_start: NaiveDate,
        cycle_length: i64,
        period_length: i64,
    },
    Retrospective {
        /// Real records, ascending by start date.
        history: &'a [PeriodRecord],
        /// Used for the open cycle after the last record and for the
        /// extrapolated cycle before the first one when only one record exists.
        fallback_cycle_length: i64,
    },
}

impl<'a> PhaseClassifier<'a> {
    pub fn prospective(profile: &UserCycleProfile) -> Option<Self> {
        let last_start = profile.last_period_date?;
        Some(PhaseClassifier::Prospective {
            last_start,
            cycle_length: profile.cycle_length(),
            period_length: profile.period_length(),
        })
    }

    pub fn retrospective(history: &'a [PeriodRecord], profile: &UserCycleProfile) -> Self {
        PhaseClassifier::Retrospective {
            history,
            fallback_cycle_length: profile.cycle_length(),
        }
    }

    /// Pick the strategy for `date`: retrospective when a later real start
    /// bounds its cycle, prospective otherwise. `None` when there is no history.
    pub fn select(
        date: NaiveDate,
        history: &'a [PeriodRecord],
        profile: &UserCycleProfile,
    ) -> Option<Self> {
        if history.is_empty() {
            return None;
        }
        if history.iter().any(|r| r.start_date > date) {
            Some(Self::retrospective(history, profile))
        } else {
            Self::prospective(profile)
        }
    }

    /// The enclosing cycle of `date`, or `None` when the date falls outside
    /// every cycle this classifier knows about.
    pub fn locate(&self, date: NaiveDate) -> Option<CyclePosition> {
        match *self {
            PhaseClassifier::Prospective {
                last_start,
                cycle_length,
                period_length,
            } => {
                if cycle_length <= 0 {
                    return None;
                }
                // floor division: backwards from last_start this rounds the
                // cycle count up, so the start never lands after `date`
                let cycles = (date - last_start).num_days().div_euclid(cycle_length);
                let cycle_start = last_start + Duration::days(cycles * cycle_length);
                Some(CyclePosition::resolve(
                    date,
                    cycle_start,
                    cycle_length,
                    period_length,
                ))
            }
            PhaseClassifier::Retrospective {
                history,
                fallback_cycle_length,
            } => locate_in_history(date, history, fallback_cycle_length),
        }
    }

    pub fn classify(&self, date: NaiveDate) -> Phase {
        self.locate(date).map(|p| p.phase).unwrap_or(Phase::Other)
    }
}

fn locate_in_history(
    date: NaiveDate,
    history: &[PeriodRecord],
    fallback_cycle_length: i64,
) -> Option<CyclePosition> {
    let first = history.first()?;

    if date < first.start_date {
        let estimated_length = history
            .get(1)
            .map(|next| (next.start_date - first.start_date).num_days())
            .unwrap_or(fallback_cycle_length);
        let cycle_start = first.start_date - Duration::days(estimated_length);
        if date < cycle_start {
            return None;
        }
        // nothing was recorded for this cycle, so it has no known period
        return Some(CyclePosition::resolve(date, cycle_start, estimated_length, 0));
    }

    for (i, record) in history.iter().enumerate() {
        let next = history.get(i + 1);
        let before_next = next.map_or(true, |n| date < n.start_date);
        if date >= record.start_date && before_next {
            let cycle_length = next
                .map(|n| (n.start_date - record.start_date).num_days())
                .unwrap_or(fallback_cycle_length);
            return Some(CyclePosition::resolve(
                date,
                record.start_date,
                cycle_length,
                i64::from(record.duration),
            ));
        }
    }

    tracing::debug!(%date, "date matches no recorded cycle");
    None
}
