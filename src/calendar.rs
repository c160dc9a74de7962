use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::models::{Phase, UserData};
use crate::phase::PhaseClassifier;

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub phase: Phase,
    /// Inside a logged period rather than a projected one.
    pub recorded: bool,
    pub is_today: bool,
}

/// Phase labels for one month of the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthView {
    pub year: i32,
    pub month: u32,
    pub has_data: bool,
    pub days: Vec<CalendarDay>,
}

pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate), CalendarError> {
    let invalid = || CalendarError::InvalidMonth { year, month };
    let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
    let last_day = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(invalid)?
        - Duration::days(1);
    Ok((first_day, last_day))
}

/// Label every day of a month. Logged period days always show as `Period`;
/// other days go through whichever classifier fits the date.
pub fn month_view(
    year: i32,
    month: u32,
    data: &UserData,
    today: NaiveDate,
) -> Result<MonthView, CalendarError> {
    let (first_day, last_day) = month_bounds(year, month)?;
    let history = data.sorted_history();

    let recorded_days: HashSet<NaiveDate> = history
        .iter()
        .flat_map(|r| (0..i64::from(r.duration)).map(move |i| r.start_date + Duration::days(i)))
        .collect();

    let days = first_day
        .iter_days()
        .take_while(|d| *d <= last_day)
        .map(|date| {
            let recorded = recorded_days.contains(&date);
            let phase = if recorded {
                Phase::Period
            } else {
                PhaseClassifier::select(date, &history, &data.profile)
                    .map(|c| c.classify(date))
                    .unwrap_or(Phase::Other)
            };
            CalendarDay {
                date,
                phase,
                recorded,
                is_today: date == today,
            }
        })
        .collect();

    Ok(MonthView {
        year,
        month,
        has_data: !history.is_empty(),
        days,
    })
}
