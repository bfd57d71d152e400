//! Batch update path
//!
//! Submits a prepared list of product writes in fixed-size batches through a
//! bounded worker pool. Each write is retried only while the catalog reports
//! throttling; every other failure is final for that item.

use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::CatalogApi;
use crate::models::{FieldError, MutationResult, ProductUpdate};
use crate::utils::error::CatalogError;
use crate::utils::pause;
use crate::utils::retry::{retry_if, RetryOutcome, RetryPolicy};

/// Pacing and retry settings for a batch submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    /// Concurrent writes inside a batch
    pub concurrency: usize,
    pub inter_batch_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            concurrency: 3,
            inter_batch_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
        }
    }
}

/// Final state of one write
#[derive(Debug)]
pub enum ItemOutcome {
    Updated { attempts: u32 },
    /// Catalog reported field errors; not retried
    Rejected { errors: Vec<FieldError>, attempts: u32 },
    /// Still throttled after the whole retry budget
    Exhausted { attempts: u32 },
    /// Non-retryable transport or decode failure
    Failed { error: CatalogError, attempts: u32 },
}

impl ItemOutcome {
    fn from_retry(outcome: RetryOutcome<MutationResult<()>, CatalogError>) -> Self {
        match outcome {
            RetryOutcome::Succeeded {
                value: MutationResult::Applied(()),
                attempts,
            } => Self::Updated { attempts },
            RetryOutcome::Succeeded {
                value: MutationResult::Rejected(errors),
                attempts,
            } => Self::Rejected { errors, attempts },
            RetryOutcome::Exhausted { attempts, .. } => Self::Exhausted { attempts },
            RetryOutcome::Terminal { error, attempts } => Self::Failed { error, attempts },
        }
    }
}

/// Per-item results of a submission
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    pub updated: Vec<String>,
    pub rejected: Vec<String>,
    pub exhausted: Vec<String>,
    pub failed: Vec<String>,
    /// Catalog calls made, retries included
    pub calls: u32,
}

impl BatchReport {
    pub fn submitted(&self) -> usize {
        self.updated.len() + self.rejected.len() + self.exhausted.len() + self.failed.len()
    }

    pub fn dropped(&self) -> usize {
        self.submitted() - self.updated.len()
    }

    fn record(&mut self, id: String, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Updated { attempts } => {
                self.calls += attempts;
                self.updated.push(id);
            }
            ItemOutcome::Rejected { errors, attempts } => {
                self.calls += attempts;
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                warn!(product_id = %id, errors = ?messages, "Product update rejected");
                self.rejected.push(id);
            }
            ItemOutcome::Exhausted { attempts } => {
                self.calls += attempts;
                warn!(product_id = %id, attempts, "Product update still throttled, dropped");
                self.exhausted.push(id);
            }
            ItemOutcome::Failed { error, attempts } => {
                self.calls += attempts;
                warn!(product_id = %id, error = %error, "Product update failed");
                self.failed.push(id);
            }
        }
    }
}

/// Worker pool for product writes
pub struct BatchUpdater<'a> {
    api: &'a dyn CatalogApi,
    config: BatchConfig,
}

impl<'a> BatchUpdater<'a> {
    pub fn new(api: &'a dyn CatalogApi, config: BatchConfig) -> Self {
        Self { api, config }
    }

    /// Submit every update and report how each ended
    pub async fn submit(&self, updates: &[ProductUpdate]) -> BatchReport {
        let mut report = BatchReport::default();
        if updates.is_empty() {
            return report;
        }

        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.concurrency.max(1);
        let batches = updates.len().div_ceil(batch_size);

        for (index, batch) in updates.chunks(batch_size).enumerate() {
            let writes: Vec<_> = batch
                .iter()
                .map(|update| self.submit_tagged(update).boxed())
                .collect();
            let outcomes: Vec<(String, ItemOutcome)> = stream::iter(writes)
                .buffer_unordered(concurrency)
                .collect()
                .await;

            for (id, outcome) in outcomes {
                report.record(id, outcome);
            }
            debug!(
                batch = index + 1,
                batches,
                updated = report.updated.len(),
                "Update batch finished"
            );

            if index + 1 < batches {
                pause(self.config.inter_batch_delay).await;
            }
        }

        info!(
            submitted = report.submitted(),
            updated = report.updated.len(),
            rejected = report.rejected.len(),
            exhausted = report.exhausted.len(),
            failed = report.failed.len(),
            calls = report.calls,
            "Batch update complete"
        );
        report
    }

    async fn submit_tagged(&self, update: &ProductUpdate) -> (String, ItemOutcome) {
        let outcome = retry_if(
            &self.config.retry,
            || self.api.update_product(update),
            CatalogError::is_rate_limited,
        )
        .await;
        (update.id.clone(), ItemOutcome::from_retry(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::{Product, ProductStatus};

    fn fast(batch_size: usize, concurrency: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            concurrency,
            inter_batch_delay: Duration::ZERO,
            retry: RetryPolicy::new(3, Duration::ZERO),
        }
    }

    fn setup(n: usize) -> (MemoryCatalog, Vec<ProductUpdate>) {
        let products = (0..n)
            .map(|i| Product::new(format!("p{i}"), ProductStatus::Active))
            .collect();
        let updates = (0..n)
            .map(|i| ProductUpdate::new(format!("p{i}")).status(ProductStatus::Draft))
            .collect();
        (MemoryCatalog::new(products), updates)
    }

    #[tokio::test]
    async fn test_all_updated() {
        let (catalog, updates) = setup(7);
        let report = BatchUpdater::new(&catalog, fast(3, 2)).submit(&updates).await;

        assert_eq!(report.updated.len(), 7);
        assert_eq!(report.calls, 7);
        assert!(catalog
            .products()
            .iter()
            .all(|p| p.status == ProductStatus::Draft));
    }

    #[tokio::test]
    async fn test_single_throttle_is_retried() {
        let (catalog, updates) = setup(10);
        catalog.rate_limit_product("p4", 1);

        let report = BatchUpdater::new(&catalog, fast(10, 3)).submit(&updates).await;
        assert_eq!(report.updated.len(), 10);
        assert_eq!(catalog.update_calls("p4"), 2);
        assert_eq!(report.calls, 11);
    }

    #[tokio::test]
    async fn test_persistent_throttle_exhausts_budget() {
        let (catalog, updates) = setup(10);
        catalog.rate_limit_product("p4", 10);

        let report = BatchUpdater::new(&catalog, fast(10, 3)).submit(&updates).await;
        assert_eq!(report.updated.len(), 9);
        assert_eq!(report.exhausted, vec!["p4".to_string()]);
        assert_eq!(catalog.update_calls("p4"), 4);
        for i in (0..10).filter(|&i| i != 4) {
            assert_eq!(catalog.update_calls(&format!("p{i}")), 1);
        }
    }

    #[tokio::test]
    async fn test_terminal_errors_not_retried() {
        let (catalog, updates) = setup(3);
        catalog.break_product("p0");
        catalog.reject_product("p1");

        let report = BatchUpdater::new(&catalog, fast(2, 2)).submit(&updates).await;
        assert_eq!(report.failed, vec!["p0".to_string()]);
        assert_eq!(report.rejected, vec!["p1".to_string()]);
        assert_eq!(report.dropped(), 2);
        assert_eq!(catalog.update_calls("p0"), 1);
        assert_eq!(catalog.update_calls("p1"), 1);
    }

    #[tokio::test]
    async fn test_calls_include_retries_before_terminal_error() {
        let (catalog, updates) = setup(2);
        catalog.rate_limit_product("p0", 2);
        catalog.reject_product("p0");
        catalog.rate_limit_product("p1", 1);
        catalog.break_product("p1");

        let report = BatchUpdater::new(&catalog, fast(2, 2)).submit(&updates).await;
        assert_eq!(report.rejected, vec!["p0".to_string()]);
        assert_eq!(report.failed, vec!["p1".to_string()]);
        assert_eq!(catalog.update_calls("p0"), 3);
        assert_eq!(catalog.update_calls("p1"), 2);
        assert_eq!(report.calls, 5);
    }

    #[tokio::test]
    async fn test_concurrency_ceiling() {
        let (catalog, updates) = setup(12);
        let catalog = catalog.with_latency(Duration::from_millis(5));

        let report = BatchUpdater::new(&catalog, fast(6, 3)).submit(&updates).await;
        assert_eq!(report.updated.len(), 12);
        assert!(catalog.max_concurrent_updates() <= 3);
        assert!(catalog.max_concurrent_updates() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_item_does_not_delay_others() {
        let (catalog, updates) = setup(10);
        catalog.rate_limit_product("p4", 1);
        let config = BatchConfig {
            retry: RetryPolicy::new(3, Duration::from_secs(2)),
            ..fast(10, 10)
        };

        let start = tokio::time::Instant::now();
        let report = BatchUpdater::new(&catalog, config).submit(&updates).await;
        assert_eq!(report.updated.len(), 10);
        // The only wait is p4's single backoff
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(start.elapsed() < Duration::from_secs(4));
    }
}
