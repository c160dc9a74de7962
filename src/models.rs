use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::Averaging;

/// One logged menstruation: the day it started and how many days it lasted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeriodRecord {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub duration: u32,
}

impl PeriodRecord {
    pub fn new(start_date: NaiveDate, duration: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            duration,
        }
    }
}

/// Declared defaults plus the values learned from the period history.
///
/// `last_period_date`, `avg_cycle_length` and `avg_period_length` are derived;
/// they are only ever written by [`UserCycleProfile::refresh`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCycleProfile {
    pub default_cycle_length: u32,
    pub default_period_length: u32,
    pub last_period_date: Option<NaiveDate>,
    pub avg_cycle_length: Option<f64>,
    pub avg_period_length: Option<f64>,
}

impl UserCycleProfile {
    pub fn new(default_cycle_length: u32, default_period_length: u32) -> Self {
        Self {
            default_cycle_length,
            default_period_length,
            last_period_date: None,
            avg_cycle_length: None,
            avg_period_length: None,
        }
    }

    /// Cycle length used for projection: learned average rounded to whole days,
    /// or the declared default.
    pub fn cycle_length(&self) -> i64 {
        self.avg_cycle_length
            .map(|avg| avg.round() as i64)
            .unwrap_or(i64::from(self.default_cycle_length))
    }

    /// Period length used for projection, same fallback rule as `cycle_length`.
    pub fn period_length(&self) -> i64 {
        self.avg_period_length
            .map(|avg| avg.round() as i64)
            .unwrap_or(i64::from(self.default_period_length))
    }
}

impl Default for UserCycleProfile {
    fn default() -> Self {
        Self::new(28, 5)
    }
}

/// Cycle phase of a single day. Variants are listed in classification priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Period,
    Ovulation,
    Fertile,
    Pms,
    Other,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Period => "period",
            Phase::Ovulation => "ovulation",
            Phase::Fertile => "fertile",
            Phase::Pms => "pms",
            Phase::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    PrePeriod,
    PeriodDay,
    PmsStart,
    PeriodLate,
    PeriodStarted,
}

impl TriggerKind {
    /// Who gets told about this event.
    pub fn recipient(&self) -> Recipient {
        match self {
            TriggerKind::PeriodDay => Recipient::User,
            TriggerKind::PeriodStarted => Recipient::Companions,
            TriggerKind::PrePeriod | TriggerKind::PmsStart | TriggerKind::PeriodLate => {
                Recipient::UserAndCompanions
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    User,
    Companions,
    UserAndCompanions,
}

/// A notification that is due. `date` is the day the trigger matched;
/// `expected_start` is the predicted period start it refers to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub kind: TriggerKind,
    pub recipient: Recipient,
    pub date: NaiveDate,
    pub expected_start: NaiveDate,
}

/// Record of a notification that was handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentNotification {
    pub kind: TriggerKind,
    pub expected_start: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NotificationLedger {
    /// Last day the scheduled triggers were evaluated for.
    pub last_checked: Option<NaiveDate>,
    pub sent: Vec<SentNotification>,
}

impl NotificationLedger {
    pub fn was_sent(&self, kind: TriggerKind, expected_start: NaiveDate) -> bool {
        self.sent
            .iter()
            .any(|s| s.kind == kind && s.expected_start == expected_start)
    }

    pub fn mark_sent(&mut self, kind: TriggerKind, expected_start: NaiveDate) {
        if !self.was_sent(kind, expected_start) {
            self.sent.push(SentNotification {
                kind,
                expected_start,
            });
        }
    }

    /// Drop entries for predicted starts older than `cutoff`.
    pub fn prune_before(&mut self, cutoff: NaiveDate) {
        self.sent.retain(|s| s.expected_start >= cutoff);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    #[serde(default)]
    pub averaging: Averaging,
    /// Days after the expected start before the "late" notice fires.
    #[serde(default = "default_late_after_days")]
    pub late_after_days: u32,
    /// How many missed days a daily check may look back over.
    #[serde(default)]
    pub catch_up_days: u32,
}

fn default_late_after_days() -> u32 {
    3
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            averaging: Averaging::default(),
            late_after_days: default_late_after_days(),
            catch_up_days: 0,
        }
    }
}

/// Everything persisted for one user.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserData {
    pub profile: UserCycleProfile,
    pub records: Vec<PeriodRecord>,
    #[serde(default)]
    pub settings: EngineSettings,
    #[serde(default)]
    pub notifications: NotificationLedger,
}

impl UserData {
    /// Records sorted ascending by start date.
    pub fn sorted_history(&self) -> Vec<PeriodRecord> {
        let mut history = self.records.clone();
        history.sort_by_key(|r| r.start_date);
        history
    }
}
