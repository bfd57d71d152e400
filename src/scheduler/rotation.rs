//! Rotation job
//!
//! One run, under the run lock:
//!
//! 1. fetch the whole catalog
//! 2. split it into active and draft products
//! 3. deactivate every active product
//! 4. select drafts to activate and bump their assignment counter
//! 5. submit both payloads through the batch updater
//! 6. write the next-run marker
//! 7. reorder each configured collection
//!
//! No single product or collection failure aborts a run. A failed catalog
//! fetch only shrinks the candidate set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};
use super::lock::{RunLock, TickOutcome};
use super::trigger::{parse_timezone, ScheduledJob};
use crate::catalog::{CatalogApi, StateStore};
use crate::config::RotationConfig;
use crate::models::{MetafieldInput, Product, ProductQuery, ProductStatus, ProductUpdate};
use crate::rotation::{
    fetch_all, select_activation, select_deactivation, target_count, BatchConfig, BatchReport,
    BatchUpdater, CollectionSorter, FetchOptions, ProductListing, ReorderReport, SelectionMode,
    SorterConfig,
};
use crate::utils::retry::RetryPolicy;

// ============================================================================
// Settings
// ============================================================================

/// Resolved rotation parameters
#[derive(Debug, Clone)]
pub struct RotationSettings {
    pub active_limit: usize,
    pub selection: SelectionMode,
    pub selection_seed: Option<u64>,
    pub fetch: FetchOptions,
    pub batch: BatchConfig,
    pub sorter: SorterConfig,
    pub collections: Vec<String>,
    pub next_run_marker: Option<String>,
    pub next_run_offset: chrono::Duration,
    pub timezone: Tz,
    pub assignment_namespace: String,
    pub assignment_key: String,
    pub exclude_tags: Vec<String>,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            active_limit: 3000,
            selection: SelectionMode::Weighted,
            selection_seed: None,
            fetch: FetchOptions::default(),
            batch: BatchConfig::default(),
            sorter: SorterConfig::default(),
            collections: Vec::new(),
            next_run_marker: None,
            next_run_offset: chrono::Duration::zero(),
            timezone: Tz::UTC,
            assignment_namespace: "custom".to_string(),
            assignment_key: "assign".to_string(),
            exclude_tags: Vec::new(),
        }
    }
}

impl RotationSettings {
    pub fn from_config(config: &RotationConfig) -> SchedulerResult<Self> {
        let (assignment_namespace, assignment_key) = config
            .assignment_metafield()
            .map_err(|e| SchedulerError::trigger_config("assignment_metafield", e.to_string()))?;
        let next_run_offset = chrono::Duration::try_minutes(config.next_run_offset_minutes)
            .ok_or_else(|| {
                SchedulerError::trigger_config("next_run_offset_minutes", "Offset out of range")
            })?;

        Ok(Self {
            active_limit: config.active_limit,
            selection: config.selection,
            selection_seed: config.selection_seed,
            fetch: config.fetch_options(),
            batch: config.batch_config(),
            sorter: config.sorter_config(),
            collections: config.collections.clone(),
            next_run_marker: config.next_run_marker.clone(),
            next_run_offset,
            timezone: parse_timezone(&config.timezone)?,
            assignment_namespace,
            assignment_key,
            exclude_tags: config.exclude_tags.clone(),
        })
    }

    /// Same settings with every pause and backoff set to zero
    pub fn without_delays(mut self) -> Self {
        self.fetch.page_delay = std::time::Duration::ZERO;
        self.sorter.fetch.page_delay = std::time::Duration::ZERO;
        self.batch.inter_batch_delay = std::time::Duration::ZERO;
        self.batch.retry = RetryPolicy::new(self.batch.retry.max_retries, std::time::Duration::ZERO);
        self
    }
}

/// Marker value for a run at `now`
pub fn next_run_value(now: DateTime<Utc>, offset: chrono::Duration, tz: Tz) -> String {
    (now + offset).with_timezone(&tz).to_rfc3339()
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CollectionOutcome {
    Reordered(ReorderReport),
    Failed { collection_id: String, error: String },
}

impl CollectionOutcome {
    pub fn is_reordered(&self) -> bool {
        matches!(self, Self::Reordered(_))
    }
}

/// What one rotation run did
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetched: usize,
    pub fetch_complete: bool,
    pub active: usize,
    pub draft: usize,
    /// Drafts eligible after tag exclusion
    pub candidates: usize,
    pub target: usize,
    /// Active products picked for deactivation
    pub deselected: Vec<String>,
    /// Drafts picked for activation
    pub selected: Vec<String>,
    pub batch: BatchReport,
    pub next_run: Option<String>,
    pub collections: Vec<CollectionOutcome>,
}

impl RunReport {
    /// Selected drafts whose activation write was applied
    pub fn activated(&self) -> Vec<&str> {
        let updated: HashSet<&str> = self.batch.updated.iter().map(String::as_str).collect();
        self.selected
            .iter()
            .map(String::as_str)
            .filter(|id| updated.contains(id))
            .collect()
    }
}

// ============================================================================
// Rotation Scheduler
// ============================================================================

pub struct RotationScheduler {
    api: Arc<dyn CatalogApi>,
    store: Arc<dyn StateStore>,
    settings: RotationSettings,
    lock: RunLock,
    rng: Mutex<ChaCha8Rng>,
}

impl RotationScheduler {
    pub fn new(
        api: Arc<dyn CatalogApi>,
        store: Arc<dyn StateStore>,
        settings: RotationSettings,
    ) -> Self {
        let rng = match settings.selection_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            api,
            store,
            settings,
            lock: RunLock::new(),
            rng: Mutex::new(rng),
        }
    }

    pub fn settings(&self) -> &RotationSettings {
        &self.settings
    }

    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// Run once unless a run is already in progress
    pub async fn tick(&self) -> TickOutcome<RunReport> {
        let Some(_guard) = self.lock.try_acquire() else {
            info!("Rotation already running, tick dropped");
            return TickOutcome::Skipped;
        };

        let run_id = Uuid::new_v4();
        let report = self
            .run(run_id)
            .instrument(info_span!("rotation_run", %run_id))
            .await;
        TickOutcome::Completed(report)
    }

    async fn run(&self, run_id: Uuid) -> RunReport {
        let started_at = Utc::now();
        info!(
            active_limit = self.settings.active_limit,
            selection = %self.settings.selection,
            "Rotation run started"
        );

        let listing = ProductListing::new(self.api.as_ref(), ProductQuery::all());
        let fetched = fetch_all(&listing, &self.settings.fetch).await;
        let fetched_count = fetched.items.len();
        if !fetched.complete {
            warn!(
                fetched = fetched_count,
                "Catalog fetch incomplete, continuing with partial snapshot"
            );
        }

        let (active, draft): (Vec<Product>, Vec<Product>) = fetched
            .items
            .into_iter()
            .partition(|p| p.status == ProductStatus::Active);
        let draft_count = draft.len();

        let deactivate = select_deactivation(&active);

        let candidates: Vec<Product> = draft.into_iter().filter(|p| !self.is_excluded(p)).collect();
        let target = target_count(self.settings.active_limit, candidates.len());
        let activate = self.select(&candidates, target);

        info!(
            active = active.len(),
            draft = draft_count,
            candidates = candidates.len(),
            target,
            selected = activate.len(),
            "Rotation payload prepared"
        );

        let payload = self.payload(&deactivate, &activate);
        let batch = BatchUpdater::new(self.api.as_ref(), self.settings.batch)
            .submit(&payload)
            .await;

        let next_run = self.record_next_run().await;
        let collections = self.reorder_collections().await;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            fetched: fetched_count,
            fetch_complete: fetched.complete,
            active: active.len(),
            draft: draft_count,
            candidates: candidates.len(),
            target,
            deselected: deactivate.into_iter().map(|p| p.id).collect(),
            selected: activate.into_iter().map(|p| p.id).collect(),
            batch,
            next_run,
            collections,
        };

        info!(
            updated = report.batch.updated.len(),
            dropped = report.batch.dropped(),
            collections = report.collections.len(),
            elapsed_ms = (report.finished_at - started_at).num_milliseconds(),
            "Rotation run finished"
        );
        report
    }

    fn is_excluded(&self, product: &Product) -> bool {
        self.settings
            .exclude_tags
            .iter()
            .any(|tag| product.has_tag(tag))
    }

    fn select(&self, candidates: &[Product], target: usize) -> Vec<Product> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        select_activation(self.settings.selection, candidates, target, &mut *rng)
    }

    /// Deactivations first, then activations; the id sets are disjoint
    fn payload(&self, deactivate: &[Product], activate: &[Product]) -> Vec<ProductUpdate> {
        let deactivated: HashSet<&str> = deactivate.iter().map(|p| p.id.as_str()).collect();

        let deactivations = deactivate
            .iter()
            .map(|p| ProductUpdate::new(p.id.clone()).status(ProductStatus::Draft));
        let activations = activate
            .iter()
            .filter(|p| !deactivated.contains(p.id.as_str()))
            .map(|p| {
                ProductUpdate::new(p.id.clone())
                    .status(ProductStatus::Active)
                    .metafield(MetafieldInput::integer(
                        &self.settings.assignment_namespace,
                        &self.settings.assignment_key,
                        p.next_assignment_count(),
                    ))
            });

        deactivations.chain(activations).collect()
    }

    async fn record_next_run(&self) -> Option<String> {
        let Some(marker) = self.settings.next_run_marker.as_deref() else {
            warn!("No next-run marker configured, skipping marker update");
            return None;
        };

        let value = next_run_value(
            Utc::now(),
            self.settings.next_run_offset,
            self.settings.timezone,
        );
        match self.store.set_next_run(marker, &value).await {
            Ok(()) => Some(value),
            Err(e) => {
                error!(marker, error = %e, "Failed to update next-run marker");
                None
            }
        }
    }

    async fn reorder_collections(&self) -> Vec<CollectionOutcome> {
        let sorter = CollectionSorter::new(self.api.as_ref(), self.settings.sorter);
        let mut outcomes = Vec::with_capacity(self.settings.collections.len());

        for collection_id in &self.settings.collections {
            match sorter.reorder(collection_id).await {
                Ok(report) => outcomes.push(CollectionOutcome::Reordered(report)),
                Err(e) => {
                    error!(collection_id = %collection_id, error = %e, "Collection reorder failed");
                    outcomes.push(CollectionOutcome::Failed {
                        collection_id: collection_id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        outcomes
    }
}

#[async_trait]
impl ScheduledJob for RotationScheduler {
    fn name(&self) -> &'static str {
        "rotation"
    }

    async fn on_trigger(&self) {
        let _ = self.tick().await;
    }
}
