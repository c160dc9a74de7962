//! Daily notification triggers.
//!
//! Triggers fire on exact date equality. A run that is skipped would miss its
//! triggers, so [`due`] can look back over `catch_up_days` and relies on the
//! ledger to avoid sending anything twice for the same predicted start.

use chrono::{Duration, NaiveDate};

use crate::models::{
    EngineSettings, Notification, NotificationLedger, PeriodRecord, TriggerKind,
};

pub const PRE_PERIOD_LEAD_DAYS: i64 = 1;
pub const PMS_LEAD_DAYS: i64 = 4;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Delivery side of notifications (bot, push, mail, ...).
pub trait Notifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

fn notice(kind: TriggerKind, date: NaiveDate, expected_start: NaiveDate) -> Notification {
    Notification {
        kind,
        recipient: kind.recipient(),
        date,
        expected_start,
    }
}

/// Triggers matching `today` exactly.
pub fn scheduled(
    today: NaiveDate,
    expected_next_start: NaiveDate,
    late_after_days: u32,
) -> Vec<Notification> {
    let checks = [
        (
            TriggerKind::PrePeriod,
            expected_next_start.checked_sub_signed(Duration::days(PRE_PERIOD_LEAD_DAYS)),
        ),
        (TriggerKind::PeriodDay, Some(expected_next_start)),
        (
            TriggerKind::PmsStart,
            expected_next_start.checked_sub_signed(Duration::days(PMS_LEAD_DAYS)),
        ),
        (
            TriggerKind::PeriodLate,
            expected_next_start.checked_add_signed(Duration::days(i64::from(late_after_days))),
        ),
    ];

    checks
        .into_iter()
        .filter(|(_, on)| *on == Some(today))
        .map(|(kind, _)| notice(kind, today, expected_next_start))
        .collect()
}

/// Companions hear about a period logged for the current day straight away.
pub fn period_started(record: &PeriodRecord, today: NaiveDate) -> Option<Notification> {
    (record.start_date == today)
        .then(|| notice(TriggerKind::PeriodStarted, today, record.start_date))
}

/// Scheduled triggers for `today` and up to `catch_up_days` before it that
/// the ledger has not seen delivered yet. Days up to `ledger.last_checked`
/// were already evaluated and are not looked at again.
pub fn due(
    today: NaiveDate,
    expected_next_start: NaiveDate,
    settings: &EngineSettings,
    ledger: &NotificationLedger,
) -> Vec<Notification> {
    let mut window = i64::from(settings.catch_up_days);
    if let Some(last) = ledger.last_checked {
        window = window.min((today - last).num_days() - 1).max(0);
    }
    (0..=window)
        .rev()
        .filter_map(|back| today.checked_sub_signed(Duration::days(back)))
        .flat_map(|day| scheduled(day, expected_next_start, settings.late_after_days))
        .filter(|n| !ledger.was_sent(n.kind, n.expected_start))
        .collect()
}
