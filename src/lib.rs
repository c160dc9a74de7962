//! Cycle prediction and phase classification.
//!
//! The engine modules (`stats`, `cycle`, `phase`, `delay`, `notify`,
//! `prediction`, `calendar`) are pure and take "today" as a parameter.
//! `tracker` owns the record lifecycle and persistence through `storage`.

pub mod calendar;
pub mod crypto;
pub mod cycle;
pub mod delay;
pub mod models;
pub mod notify;
pub mod phase;
pub mod prediction;
pub mod stats;
pub mod storage;
pub mod tracker;

pub use cycle::CycleBoundaries;
pub use delay::{cycle_status, CycleStatus, DayStatus};
pub use models::{Notification, PeriodRecord, Phase, TriggerKind, UserCycleProfile};
pub use phase::{CyclePosition, PhaseClassifier};
pub use stats::{estimate, Averaging, CycleAverages};
pub use tracker::{CycleTracker, TrackerError};
