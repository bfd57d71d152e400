//! Unified error handling for the shelf-rotation crate
//!
//! Domain errors stay close to where they are raised ([`CatalogError`] at the
//! API boundary, [`SortError`] in the sorter, [`SchedulerError`] around
//! triggers). This module folds them into one [`Error`] for callers that
//! cross module boundaries, such as the CLI.
//!
//! # Usage
//!
//! ```rust,ignore
//! use shelf_rotation::error::{Error, ErrorCategory};
//!
//! fn report(err: &Error) -> std::process::ExitCode {
//!     eprintln!("Error ({}): {err}", err.category());
//!     std::process::ExitCode::from(err.exit_code())
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::rotation::SortError;
pub use crate::scheduler::error::SchedulerError;
pub use crate::utils::error::{CatalogError, StateError};

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Catalog transport, throttling and HTTP status errors
    Network,
    /// Configuration and validation errors
    Config,
    /// Trigger and timing errors
    Scheduler,
    /// Next-run marker and local I/O errors
    Storage,
    /// Response or file decoding errors
    Parsing,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Config => "config",
            Self::Scheduler => "scheduler",
            Self::Storage => "storage",
            Self::Parsing => "parsing",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the shelf-rotation crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Sort error: {0}")]
    Sort(#[from] SortError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Wrap a config loading or validation failure, keeping its context chain
    pub fn invalid_config(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }

    /// Process exit status for a failed command
    ///
    /// 78 for configuration problems, 75 when a later attempt could succeed,
    /// 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.category() == ErrorCategory::Config {
            78
        } else if self.is_recoverable() {
            75
        } else {
            1
        }
    }

    /// Check if retrying the failed operation could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Catalog(e) => e.is_recoverable(),
            Self::State(StateError::Catalog(e)) => e.is_recoverable(),
            Self::State(StateError::Rejected(_)) => false,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Sort(SortError::IncompleteFetch { .. }) => true,
            Self::Sort(SortError::Catalog { source, .. }) => source.is_recoverable(),
            Self::Sort(_) => false,
            Self::Io(_) => true,
            Self::Json(_) | Self::Config(_) => false,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Catalog(CatalogError::Decode(_)) => ErrorCategory::Parsing,
            Self::Catalog(_) | Self::Sort(_) => ErrorCategory::Network,
            Self::State(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Scheduler(SchedulerError::TriggerConfigError { .. })
            | Self::Scheduler(SchedulerError::InvalidCron { .. })
            | Self::Scheduler(SchedulerError::InvalidTimezone { .. }) => ErrorCategory::Config,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Json(_) => ErrorCategory::Parsing,
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
