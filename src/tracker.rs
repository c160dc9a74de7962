use std::sync::Mutex;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::calendar::{self, CalendarError, MonthView};
use crate::crypto::CryptoError;
use crate::delay::{self, CycleStatus};
use crate::models::*;
use crate::notify::{self, Notifier};
use crate::phase::{CyclePosition, PhaseClassifier};
use crate::prediction::{self, FertilityWindow, Prediction};
use crate::stats::{self, CycleStats};
use crate::storage::{Storage, StorageError};

pub const PERIOD_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 2..=12;
pub const CYCLE_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 21..=60;

/// Upper bound for `late_after_days` and `catch_up_days`.
pub const MAX_SETTING_DAYS: u32 = 60;

/// Ledger entries are kept this long after the start they refer to.
const LEDGER_RETENTION_DAYS: i64 = 365;

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("tracker is locked")]
    Locked,
    #[error("data already exists at {0}")]
    AlreadySetUp(String),
    #[error("period length must be 2-12 days, got {0}")]
    InvalidPeriodLength(u32),
    #[error("cycle length must be 21-60 days, got {0}")]
    InvalidCycleLength(u32),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("state lock poisoned")]
    Poisoned,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error("export failed: {0}")]
    Export(#[from] serde_json::Error),
}

/// Values collected during onboarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Onboarding {
    pub cycle_length: u32,
    pub period_length: u32,
    /// Seeds the history with one record of `period_length` days.
    pub last_period_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Overview {
    pub status: CycleStatus,
    pub prediction: Option<Prediction>,
    pub fertility: Option<FertilityWindow>,
    pub stats: CycleStats,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub today: NaiveDate,
    pub status: CycleStatus,
    pub sent: Vec<Notification>,
    pub failed: Vec<Notification>,
}

fn check_period_length(days: u32) -> Result<(), TrackerError> {
    if PERIOD_LENGTH_RANGE.contains(&days) {
        Ok(())
    } else {
        Err(TrackerError::InvalidPeriodLength(days))
    }
}

fn check_cycle_length(days: u32) -> Result<(), TrackerError> {
    if CYCLE_LENGTH_RANGE.contains(&days) {
        Ok(())
    } else {
        Err(TrackerError::InvalidCycleLength(days))
    }
}

fn check_settings(settings: &EngineSettings) -> Result<(), TrackerError> {
    if !settings.averaging.is_valid() {
        return Err(TrackerError::InvalidSettings(format!(
            "decay factor must be in (0, 1], got {:?}",
            settings.averaging
        )));
    }
    if settings.late_after_days > MAX_SETTING_DAYS {
        return Err(TrackerError::InvalidSettings(format!(
            "late_after_days must be at most {MAX_SETTING_DAYS}, got {}",
            settings.late_after_days
        )));
    }
    if settings.catch_up_days > MAX_SETTING_DAYS {
        return Err(TrackerError::InvalidSettings(format!(
            "catch_up_days must be at most {MAX_SETTING_DAYS}, got {}",
            settings.catch_up_days
        )));
    }
    Ok(())
}

/// One user's cycle data, decrypted while unlocked.
///
/// Lock order is `data` then `passphrase`.
pub struct CycleTracker {
    storage: Storage,
    passphrase: Mutex<Option<Zeroizing<String>>>,
    data: Mutex<Option<UserData>>,
}

impl CycleTracker {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            passphrase: Mutex::new(None),
            data: Mutex::new(None),
        }
    }

    pub fn is_setup(&self) -> bool {
        self.storage.exists()
    }

    pub fn is_unlocked(&self) -> bool {
        self.data.lock().map(|d| d.is_some()).unwrap_or(false)
    }

    pub fn setup(&self, passphrase: &str, onboarding: Onboarding) -> Result<(), TrackerError> {
        if self.storage.exists() {
            return Err(TrackerError::AlreadySetUp(
                self.storage.path().display().to_string(),
            ));
        }
        check_cycle_length(onboarding.cycle_length)?;
        check_period_length(onboarding.period_length)?;

        let mut data = UserData {
            profile: UserCycleProfile::new(onboarding.cycle_length, onboarding.period_length),
            ..UserData::default()
        };
        if let Some(start) = onboarding.last_period_date {
            data.records
                .push(PeriodRecord::new(start, onboarding.period_length));
        }
        data.profile.refresh(&data.records, data.settings.averaging);

        self.storage.save(passphrase, &data)?;
        *self.data.lock().map_err(|_| TrackerError::Poisoned)? = Some(data);
        *self.passphrase.lock().map_err(|_| TrackerError::Poisoned)? =
            Some(Zeroizing::new(passphrase.to_owned()));

        tracing::info!(path = %self.storage.path().display(), "tracker set up");
        Ok(())
    }

    /// Returns `false` for a wrong passphrase. A file that is not ours, or
    /// cannot be read, is an error.
    pub fn unlock(&self, passphrase: &str) -> Result<bool, TrackerError> {
        let mut data = match self.storage.load(passphrase) {
            Ok(data) => data,
            Err(StorageError::Crypto(CryptoError::Decryption)) => {
                tracing::warn!("unlock rejected");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if let Err(e) = check_settings(&data.settings) {
            tracing::warn!(error = %e, "stored settings reset to defaults");
            data.settings = EngineSettings::default();
        }
        // derived fields are never trusted from disk
        data.profile.refresh(&data.records, data.settings.averaging);

        *self.data.lock().map_err(|_| TrackerError::Poisoned)? = Some(data);
        *self.passphrase.lock().map_err(|_| TrackerError::Poisoned)? =
            Some(Zeroizing::new(passphrase.to_owned()));
        Ok(true)
    }

    /// Drop decrypted data and the passphrase from memory.
    pub fn lock(&self) {
        if let Ok(mut data) = self.data.lock() {
            *data = None;
        }
        if let Ok(mut pass) = self.passphrase.lock() {
            *pass = None;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&UserData) -> T) -> Result<T, TrackerError> {
        let guard = self.data.lock().map_err(|_| TrackerError::Poisoned)?;
        let data = guard.as_ref().ok_or(TrackerError::Locked)?;
        Ok(f(data))
    }

    /// Apply `change` to a copy of the data, re-derive the profile, persist,
    /// and only then publish the copy. A failed save leaves memory untouched.
    fn transact<T>(
        &self,
        change: impl FnOnce(&mut UserData) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut guard = self.data.lock().map_err(|_| TrackerError::Poisoned)?;
        self.commit(&mut guard, change)
    }

    /// Body of [`Self::transact`] for callers already holding the data lock.
    fn commit<T>(
        &self,
        current: &mut Option<UserData>,
        change: impl FnOnce(&mut UserData) -> Result<T, TrackerError>,
    ) -> Result<T, TrackerError> {
        let mut next = current.as_ref().ok_or(TrackerError::Locked)?.clone();

        let out = change(&mut next)?;
        next.profile.refresh(&next.records, next.settings.averaging);

        {
            let pass = self.passphrase.lock().map_err(|_| TrackerError::Poisoned)?;
            let pass = pass.as_ref().ok_or(TrackerError::Locked)?;
            self.storage.save(pass, &next)?;
        }
        *current = Some(next);
        Ok(out)
    }

    /// Log a period; a second entry for the same start date updates its
    /// duration. Returns the companion notice when the period starts today.
    pub fn log_period(
        &self,
        start_date: NaiveDate,
        duration: u32,
        today: NaiveDate,
    ) -> Result<Option<Notification>, TrackerError> {
        check_period_length(duration)?;

        let record = self.transact(|data| {
            if let Some(existing) = data
                .records
                .iter_mut()
                .find(|r| r.start_date == start_date)
            {
                existing.duration = duration;
                return Ok(existing.clone());
            }
            let record = PeriodRecord::new(start_date, duration);
            data.records.push(record.clone());
            Ok(record)
        })?;

        tracing::info!(%start_date, duration, "period logged");
        Ok(notify::period_started(&record, today))
    }

    /// Remove the record with the latest start date.
    pub fn remove_last_period(&self) -> Result<Option<PeriodRecord>, TrackerError> {
        let removed = self.transact(|data| {
            let latest = data
                .records
                .iter()
                .enumerate()
                .max_by_key(|(_, r)| r.start_date)
                .map(|(i, _)| i);
            Ok(latest.map(|i| data.records.remove(i)))
        })?;

        if let Some(record) = &removed {
            tracing::info!(start_date = %record.start_date, "last period removed");
        }
        Ok(removed)
    }

    pub fn remove_all_periods(&self) -> Result<usize, TrackerError> {
        let count = self.transact(|data| {
            let count = data.records.len();
            data.records.clear();
            Ok(count)
        })?;
        tracing::info!(count, "all periods removed");
        Ok(count)
    }

    pub fn update_defaults(
        &self,
        cycle_length: u32,
        period_length: u32,
    ) -> Result<UserCycleProfile, TrackerError> {
        check_cycle_length(cycle_length)?;
        check_period_length(period_length)?;
        self.transact(|data| {
            data.profile.default_cycle_length = cycle_length;
            data.profile.default_period_length = period_length;
            Ok(())
        })?;
        self.profile()
    }

    pub fn update_settings(&self, settings: EngineSettings) -> Result<(), TrackerError> {
        check_settings(&settings)?;
        self.transact(|data| {
            data.settings = settings;
            Ok(())
        })
    }

    pub fn settings(&self) -> Result<EngineSettings, TrackerError> {
        self.read(|data| data.settings.clone())
    }

    pub fn profile(&self) -> Result<UserCycleProfile, TrackerError> {
        self.read(|data| data.profile.clone())
    }

    /// Records ascending by start date.
    pub fn history(&self) -> Result<Vec<PeriodRecord>, TrackerError> {
        self.read(|data| data.sorted_history())
    }

    pub fn stats(&self) -> Result<CycleStats, TrackerError> {
        self.read(|data| stats::cycle_stats(&data.records, data.settings.averaging))
    }

    pub fn status(&self, today: NaiveDate) -> Result<CycleStatus, TrackerError> {
        self.read(|data| delay::cycle_status(today, &data.profile))
    }

    /// Phase and cycle position of a single date; `None` without history.
    pub fn position_on(&self, date: NaiveDate) -> Result<Option<CyclePosition>, TrackerError> {
        self.read(|data| {
            let history = data.sorted_history();
            PhaseClassifier::select(date, &history, &data.profile).and_then(|c| c.locate(date))
        })
    }

    pub fn phase_on(&self, date: NaiveDate) -> Result<Phase, TrackerError> {
        Ok(self
            .position_on(date)?
            .map(|p| p.phase)
            .unwrap_or(Phase::Other))
    }

    pub fn month(
        &self,
        year: i32,
        month: u32,
        today: NaiveDate,
    ) -> Result<MonthView, TrackerError> {
        let guard = self.data.lock().map_err(|_| TrackerError::Poisoned)?;
        let data = guard.as_ref().ok_or(TrackerError::Locked)?;
        Ok(calendar::month_view(year, month, data, today)?)
    }

    pub fn overview(&self, today: NaiveDate) -> Result<Overview, TrackerError> {
        self.read(|data| Overview {
            status: delay::cycle_status(today, &data.profile),
            prediction: prediction::predict(&data.profile, &data.records),
            fertility: prediction::fertility_window(&data.profile),
            stats: stats::cycle_stats(&data.records, data.settings.averaging),
        })
    }

    /// Evaluate scheduled triggers for `today` and hand the due ones to
    /// `notifier`. Only delivered notifications are recorded; failed ones
    /// stay due for the next run.
    ///
    /// The data lock is held across delivery so overlapping runs in one
    /// process cannot both send the same trigger. Other calls wait until
    /// the notifier returns.
    pub fn run_daily_check(
        &self,
        today: NaiveDate,
        notifier: &dyn Notifier,
    ) -> Result<DailyReport, TrackerError> {
        let mut guard = self.data.lock().map_err(|_| TrackerError::Poisoned)?;
        let (status, due) = {
            let data = guard.as_ref().ok_or(TrackerError::Locked)?;
            let status = delay::cycle_status(today, &data.profile);
            let due = match prediction::expected_next_start(&data.profile) {
                Some(expected) => {
                    notify::due(today, expected, &data.settings, &data.notifications)
                }
                None => Vec::new(),
            };
            (status, due)
        };

        let mut sent = Vec::new();
        let mut failed = Vec::new();
        for notification in due {
            match notifier.send(&notification) {
                Ok(()) => {
                    tracing::info!(
                        kind = ?notification.kind,
                        date = %notification.date,
                        "notification sent"
                    );
                    sent.push(notification);
                }
                Err(e) => {
                    tracing::warn!(
                        kind = ?notification.kind,
                        error = %e,
                        "notification delivery failed"
                    );
                    failed.push(notification);
                }
            }
        }

        self.commit(&mut guard, |data| {
            for n in &sent {
                data.notifications.mark_sent(n.kind, n.expected_start);
            }
            // a day with failed deliveries stays open for catch-up
            if failed.is_empty() {
                data.notifications.last_checked = Some(today);
            }
            data.notifications
                .prune_before(today - Duration::days(LEDGER_RETENTION_DAYS));
            Ok(())
        })?;

        Ok(DailyReport {
            today,
            status,
            sent,
            failed,
        })
    }

    pub fn export_data(&self) -> Result<String, TrackerError> {
        let json = self.read(|data| serde_json::to_string_pretty(data))??;
        Ok(json)
    }

    pub fn wipe_all_data(&self) -> Result<(), TrackerError> {
        self.lock();
        self.storage.wipe()?;
        Ok(())
    }
}
