//! Tag sweep job
//!
//! Periodically strips a marker tag (by default `no-rotation`) from every
//! product of one status, so products parked out of a rotation become
//! eligible again. Runs under its own lock with the same drop-on-contention
//! semantics as the rotation job.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use super::lock::{RunLock, TickOutcome};
use super::trigger::ScheduledJob;
use crate::catalog::CatalogApi;
use crate::config::SweepConfig;
use crate::models::{ProductQuery, ProductStatus};
use crate::rotation::{fetch_all, FetchOptions, MutatorConfig, ProductListing, TagMutation, TagMutator};

#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub tag: String,
    pub status: ProductStatus,
    pub fetch: FetchOptions,
    pub mutator: MutatorConfig,
}

impl SweepSettings {
    pub fn from_config(config: &SweepConfig, fetch: FetchOptions) -> Self {
        Self {
            tag: config.tag.clone(),
            status: config.status,
            fetch,
            mutator: config.mutator_config(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub run_id: Uuid,
    pub found: usize,
    pub changed: Vec<String>,
    pub fetch_complete: bool,
}

pub struct SweepJob {
    api: Arc<dyn CatalogApi>,
    settings: SweepSettings,
    lock: RunLock,
}

impl SweepJob {
    pub fn new(api: Arc<dyn CatalogApi>, settings: SweepSettings) -> Self {
        Self {
            api,
            settings,
            lock: RunLock::new(),
        }
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Sweep once unless a sweep is already in progress
    pub async fn tick(&self) -> TickOutcome<SweepReport> {
        let Some(_guard) = self.lock.try_acquire() else {
            info!(tag = %self.settings.tag, "Tag sweep already running, tick dropped");
            return TickOutcome::Skipped;
        };

        let run_id = Uuid::new_v4();
        let report = self
            .run(run_id)
            .instrument(info_span!("tag_sweep", %run_id))
            .await;
        TickOutcome::Completed(report)
    }

    async fn run(&self, run_id: Uuid) -> SweepReport {
        let query = ProductQuery::with_status(self.settings.status).tagged(&self.settings.tag);
        let listing = ProductListing::new(self.api.as_ref(), query);
        let fetched = fetch_all(&listing, &self.settings.fetch).await;

        let mut report = SweepReport {
            run_id,
            found: fetched.items.len(),
            changed: Vec::new(),
            fetch_complete: fetched.complete,
        };
        if fetched.is_empty() {
            info!(tag = %self.settings.tag, "No tagged products to sweep");
            return report;
        }

        let mutation = TagMutation::new()
            .replace(&self.settings.tag)
            .filter(self.settings.status.into());
        let changed = TagMutator::new(self.api.as_ref(), self.settings.mutator)
            .apply(&fetched.items, &mutation)
            .await;
        report.changed = changed.into_iter().map(|p| p.id).collect();

        info!(
            tag = %self.settings.tag,
            found = report.found,
            changed = report.changed.len(),
            "Tag sweep finished"
        );
        report
    }
}

#[async_trait]
impl ScheduledJob for SweepJob {
    fn name(&self) -> &'static str {
        "tag-sweep"
    }

    async fn on_trigger(&self) {
        let _ = self.tick().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::models::Product;
    use std::time::Duration;

    fn settings() -> SweepSettings {
        SweepSettings {
            tag: "no-rotation".to_string(),
            status: ProductStatus::Draft,
            fetch: FetchOptions::new(10, Duration::ZERO),
            mutator: MutatorConfig {
                batch_size: 25,
                concurrency: 1,
                inter_batch_delay: Duration::ZERO,
                inter_chunk_delay: Duration::ZERO,
            },
        }
    }

    #[tokio::test]
    async fn test_sweep_removes_tag_from_drafts_only() {
        let catalog = Arc::new(MemoryCatalog::new(vec![
            Product::new("d1", ProductStatus::Draft).with_tags(["no-rotation", "new"]),
            Product::new("d2", ProductStatus::Draft).with_tags(["used"]),
            Product::new("a1", ProductStatus::Active).with_tags(["no-rotation"]),
        ]));
        let job = SweepJob::new(catalog.clone(), settings());

        let report = job.tick().await.completed().unwrap();
        assert_eq!(report.found, 1);
        assert_eq!(report.changed, vec!["d1".to_string()]);
        assert!(!catalog.product("d1").unwrap().has_tag("no-rotation"));
        assert!(catalog.product("d1").unwrap().has_tag("new"));
        assert!(catalog.product("a1").unwrap().has_tag("no-rotation"));
    }

    #[tokio::test]
    async fn test_sweep_skipped_while_locked() {
        let catalog = Arc::new(MemoryCatalog::default());
        let job = SweepJob::new(catalog.clone(), settings());

        let _held = job.lock().try_acquire();
        assert!(job.tick().await.is_skipped());
        assert_eq!(catalog.list_page_calls(), 0);
    }
}
