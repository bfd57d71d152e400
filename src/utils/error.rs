//! Error types for the catalog collaborators
//!
//! Every call into the catalog or the state store resolves into one of these,
//! decoded at the API boundary.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while calling the Catalog API
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Network-level failure (connection refused, reset, DNS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Collaborator signalled throttling (HTTP 429 or a THROTTLED error code)
    #[error("Rate limited")]
    RateLimited {
        /// Server-suggested wait, when provided
        retry_after: Option<Duration>,
    },

    /// Non-success HTTP status other than 429
    #[error("HTTP status: {0}")]
    Status(u16),

    /// Top-level GraphQL errors
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),

    /// Response body did not have the expected shape
    #[error("Decoding error: {0}")]
    Decode(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),
}

impl CatalogError {
    /// Whether the collaborator asked us to slow down
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if the error is likely transient
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited { .. } => true,
            Self::Status(code) => *code >= 500,
            Self::GraphQl(_) | Self::Decode(_) | Self::NotFound(_) => false,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            if status.as_u16() == 429 {
                Self::RateLimited { retry_after: None }
            } else {
                Self::Status(status.as_u16())
            }
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors that can occur while reading or writing the next-run marker
#[derive(Error, Debug)]
pub enum StateError {
    /// The underlying catalog call failed
    #[error("State store call failed: {0}")]
    Catalog(#[from] CatalogError),

    /// The store rejected the write
    #[error("State store rejected write: {}", .0.join("; "))]
    Rejected(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_classification() {
        let err = CatalogError::RateLimited { retry_after: None };
        assert!(err.is_rate_limited());
        assert!(err.is_recoverable());
        assert!(!CatalogError::Timeout.is_rate_limited());
    }

    #[test]
    fn test_status_recoverable() {
        assert!(CatalogError::Status(503).is_recoverable());
        assert!(!CatalogError::Status(401).is_recoverable());
    }

    #[test]
    fn test_graphql_error_display() {
        let err = CatalogError::GraphQl(vec!["Field missing".into(), "Bad id".into()]);
        assert_eq!(err.to_string(), "GraphQL errors: Field missing; Bad id");
    }

    #[test]
    fn test_state_error_from_catalog() {
        let err: StateError = CatalogError::Timeout.into();
        assert!(matches!(err, StateError::Catalog(CatalogError::Timeout)));
    }
}
