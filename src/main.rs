//! Daily check runner: evaluates today's notification triggers for the
//! stored user and prints due notifications as JSON lines on stdout.
//!
//! Environment:
//! - `CYCLECAST_PASSPHRASE` (required)
//! - `CYCLECAST_DATA` path of the data file (defaults to the platform data dir)
//! - `CYCLECAST_LOG` tracing filter (defaults to `info`)

use std::env;

use anyhow::{bail, Context, Result};
use cyclecast::models::Notification;
use cyclecast::notify::{Notifier, NotifyError};
use cyclecast::storage::Storage;
use cyclecast::CycleTracker;
use tracing_subscriber::EnvFilter;

/// Writes each notification to stdout for whatever delivers them.
struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let line = serde_json::to_string(notification)
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;
        println!("{line}");
        Ok(())
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("CYCLECAST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let passphrase = env::var("CYCLECAST_PASSPHRASE").context("CYCLECAST_PASSPHRASE is not set")?;
    let storage = match env::var("CYCLECAST_DATA") {
        Ok(path) => Storage::at(path),
        Err(_) => Storage::default_location()?,
    };

    let tracker = CycleTracker::new(storage);
    if !tracker.is_setup() {
        bail!("no data file found; set up the tracker first");
    }
    if !tracker.unlock(&passphrase)? {
        bail!("wrong passphrase");
    }

    let today = chrono::Local::now().date_naive();
    let report = tracker.run_daily_check(today, &StdoutNotifier)?;
    tracing::info!(
        %today,
        sent = report.sent.len(),
        failed = report.failed.len(),
        "daily check finished"
    );
    tracker.lock();

    if !report.failed.is_empty() {
        bail!("{} notification(s) could not be delivered", report.failed.len());
    }
    Ok(())
}
