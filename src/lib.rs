//! shelf-rotation - scheduled catalog rotation
//!
//! Keeps a storefront's active catalog fresh: on a recurring schedule it
//! deactivates the active products, activates a weighted random slice of
//! tagged drafts, records when the next run happens, and reorders curated
//! collections so `new` stock leads.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`catalog`] - Catalog API client, state store and in-memory doubles
//! - [`rotation`] - Fetch, selection, batch update, tag mutation and sorting
//! - [`scheduler`] - Cron triggers, run locks and the scheduled jobs
//! - [`stats`] - Dashboard counts
//! - [`models`] - Core data structures and types
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use shelf_rotation::catalog::{AdminClient, ClientConfig, MetaobjectStateStore};
//! use shelf_rotation::config::Config;
//! use shelf_rotation::scheduler::{RotationScheduler, RotationSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let client = Arc::new(AdminClient::new(ClientConfig::new(
//!         &config.catalog.endpoint,
//!         &config.catalog.access_token,
//!     ))?);
//!     let store = Arc::new(MetaobjectStateStore::new(
//!         client.clone(),
//!         &config.rotation.next_run_field,
//!     ));
//!     let settings = RotationSettings::from_config(&config.rotation)?;
//!     let scheduler = RotationScheduler::new(client, store, settings);
//!     // scheduler.tick().await;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod rotation;
pub mod scheduler;
pub mod stats;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::catalog::{CatalogApi, StateStore};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{CategoryTag, Product, ProductStatus, ProductUpdate};
    pub use crate::rotation::{SelectionMode, TagMutation};
    pub use crate::scheduler::{RotationScheduler, RunReport, SweepJob, TickOutcome};
    pub use crate::stats::DashboardStats;
}

// Direct re-exports for convenience
pub use models::{CategoryTag, Product, ProductStatus};
