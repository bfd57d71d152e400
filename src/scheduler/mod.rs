//! Scheduled jobs
//!
//! This module drives the rotation engine on a recurring time rule.
//!
//! # Overview
//!
//! A [`CronTrigger`] sleeps until the next fire time of its rule and hands
//! the fire to a [`ScheduledJob`]. Each job owns a [`RunLock`]: a fire that
//! arrives while the previous run is still going is dropped and logged,
//! never queued.
//!
//! ```text
//!  CronTrigger ──fire──▶ RotationScheduler ──▶ fetch ─▶ select ─▶ batch update
//!       │                   (RunLock)                              │
//!       │                                                          ▼
//!       │                                          next-run marker ─▶ reorder
//!       └──fire──▶ SweepJob (RunLock) ──▶ fetch tagged ─▶ tag mutator
//! ```
//!
//! # Modules
//!
//! - [`lock`] - Idle/Running lock with a releasing guard
//! - [`trigger`] - cron rule parsing and the trigger loop
//! - [`rotation`] - the rotation job
//! - [`sweep`] - the tag sweep job
//! - [`error`] - scheduler errors
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use shelf_rotation::catalog::{MemoryCatalog, MemoryStateStore};
//! use shelf_rotation::scheduler::{CronTrigger, RotationScheduler, RotationSettings, TriggerConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Arc::new(RotationScheduler::new(
//!     Arc::new(MemoryCatalog::default()),
//!     Arc::new(MemoryStateStore::new()),
//!     RotationSettings::default(),
//! ));
//!
//! let trigger = CronTrigger::new(TriggerConfig::new("0 */2 * * * *", "UTC"))?;
//! let handle = trigger.spawn(scheduler);
//! // ...
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod lock;
pub mod rotation;
pub mod sweep;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use lock::{RunGuard, RunLock, RunState, TickOutcome};
pub use rotation::{CollectionOutcome, RotationScheduler, RotationSettings, RunReport};
pub use sweep::{SweepJob, SweepReport, SweepSettings};
pub use trigger::{CronTrigger, ScheduledJob, TriggerConfig, TriggerHandle};
