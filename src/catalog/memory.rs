//! In-memory catalog
//!
//! A [`CatalogApi`] backed by plain collections, with failure injection so
//! rate limiting, field errors and transport faults can be exercised without
//! a network. Cursors are stringified offsets.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{CatalogApi, CatalogResult};
use crate::models::{
    CollectionMember, CollectionMove, FieldError, MutationResult, Page, PageInfo, Product,
    ProductQuery, ProductUpdate, SortMode,
};
use crate::utils::error::CatalogError;

#[derive(Debug, Clone)]
struct CollectionState {
    members: Vec<String>,
    sort_mode: SortMode,
}

#[derive(Debug, Default)]
struct Faults {
    /// Remaining throttled responses per product id
    rate_limits: HashMap<String, u32>,
    /// Product ids whose updates are rejected with field errors
    rejected: HashSet<String>,
    /// Product ids whose updates fail at the transport level
    broken: HashSet<String>,
    /// Product listing fails on this page index (0-based)
    fail_listing_at_page: Option<usize>,
    /// Product counts fail at the transport level
    fail_counts: bool,
    /// Collections whose sort-mode change is rejected
    sort_mode_rejected: HashSet<String>,
    /// Collections whose reorder is rejected from this chunk index (0-based)
    reorder_rejected_from: HashMap<String, usize>,
}

#[derive(Debug, Default)]
struct Calls {
    list_pages: usize,
    updates: HashMap<String, u32>,
    applied_updates: Vec<ProductUpdate>,
    reorder_chunks: HashMap<String, Vec<usize>>,
}

/// In-process catalog implementation
#[derive(Debug)]
pub struct MemoryCatalog {
    products: Mutex<Vec<Product>>,
    collections: Mutex<HashMap<String, CollectionState>>,
    faults: Mutex<Faults>,
    calls: Mutex<Calls>,
    assignment_key: String,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MemoryCatalog {
    /// Create a catalog holding `products` in catalog order
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: Mutex::new(products),
            collections: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Calls::default()),
            assignment_key: "assign".to_string(),
            latency: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delay every update call, making concurrency observable
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a collection with members in their current order
    pub fn with_collection(self, id: impl Into<String>, members: Vec<String>) -> Self {
        self.collections_guard().insert(
            id.into(),
            CollectionState {
                members,
                sort_mode: SortMode::BestSelling,
            },
        );
        self
    }

    /// Throttle the next `times` updates of a product
    pub fn rate_limit_product(&self, id: &str, times: u32) {
        self.faults_guard().rate_limits.insert(id.to_string(), times);
    }

    /// Reject every update of a product with a field error
    pub fn reject_product(&self, id: &str) {
        self.faults_guard().rejected.insert(id.to_string());
    }

    /// Fail every update of a product at the transport level
    pub fn break_product(&self, id: &str) {
        self.faults_guard().broken.insert(id.to_string());
    }

    /// Fail product listing on the given page
    pub fn fail_listing_at_page(&self, page: usize) {
        self.faults_guard().fail_listing_at_page = Some(page);
    }

    /// Fail every product count
    pub fn fail_counts(&self) {
        self.faults_guard().fail_counts = true;
    }

    /// Reject sort-mode changes for a collection
    pub fn reject_sort_mode(&self, collection_id: &str) {
        self.faults_guard()
            .sort_mode_rejected
            .insert(collection_id.to_string());
    }

    /// Reject reorder chunks for a collection starting at `chunk`
    pub fn reject_reorder_from_chunk(&self, collection_id: &str, chunk: usize) {
        self.faults_guard()
            .reorder_rejected_from
            .insert(collection_id.to_string(), chunk);
    }

    /// Snapshot of every product
    pub fn products(&self) -> Vec<Product> {
        self.products_guard().clone()
    }

    /// Snapshot of one product
    pub fn product(&self, id: &str) -> Option<Product> {
        self.products_guard().iter().find(|p| p.id == id).cloned()
    }

    /// Current member order of a collection
    pub fn collection_order(&self, id: &str) -> Option<Vec<String>> {
        self.collections_guard().get(id).map(|c| c.members.clone())
    }

    pub fn collection_sort_mode(&self, id: &str) -> Option<SortMode> {
        self.collections_guard().get(id).map(|c| c.sort_mode)
    }

    /// Number of product listing pages served
    pub fn list_page_calls(&self) -> usize {
        self.calls_guard().list_pages
    }

    /// Update calls received for a product, including failed ones
    pub fn update_calls(&self, id: &str) -> u32 {
        self.calls_guard().updates.get(id).copied().unwrap_or(0)
    }

    /// Update calls received across all products
    pub fn total_update_calls(&self) -> u32 {
        self.calls_guard().updates.values().sum()
    }

    /// Updates that were applied, in application order
    pub fn applied_updates(&self) -> Vec<ProductUpdate> {
        self.calls_guard().applied_updates.clone()
    }

    /// Sizes of the reorder chunks received for a collection
    pub fn reorder_chunks(&self, id: &str) -> Vec<usize> {
        self.calls_guard()
            .reorder_chunks
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Highest number of concurrent update calls observed
    pub fn max_concurrent_updates(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn products_guard(&self) -> std::sync::MutexGuard<'_, Vec<Product>> {
        self.products.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn collections_guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, CollectionState>> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn faults_guard(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn calls_guard(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn page_of<T: Clone>(all: &[T], first: usize, after: Option<String>) -> CatalogResult<Page<T>> {
        let start = match after {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| CatalogError::Decode(format!("bad cursor '{cursor}'")))?,
            None => 0,
        };
        let end = (start + first.max(1)).min(all.len());
        let items = all.get(start..end).map(<[T]>::to_vec).unwrap_or_default();

        Ok(Page {
            items,
            page_info: PageInfo {
                has_next_page: end < all.len(),
                end_cursor: Some(end.to_string()),
            },
        })
    }

    fn apply_update(&self, update: &ProductUpdate) -> CatalogResult<()> {
        let mut products = self.products_guard();
        let product = products
            .iter_mut()
            .find(|p| p.id == update.id)
            .ok_or_else(|| CatalogError::NotFound(update.id.clone()))?;

        if let Some(status) = update.status {
            product.status = status;
        }
        if let Some(tags) = &update.tags {
            product.tags = tags.clone();
        }
        for metafield in &update.metafields {
            if metafield.key == self.assignment_key {
                product.assignment_count = metafield.value.parse().ok();
            }
        }
        Ok(())
    }
}

/// Tracks one in-flight update for concurrency accounting
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogApi for MemoryCatalog {
    async fn list_products(
        &self,
        query: &ProductQuery,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<Product>> {
        let page_index = {
            let mut calls = self.calls_guard();
            calls.list_pages += 1;
            calls.list_pages - 1
        };
        if self.faults_guard().fail_listing_at_page == Some(page_index) {
            return Err(CatalogError::Transport("connection reset".to_string()));
        }

        let matching: Vec<Product> = self
            .products_guard()
            .iter()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        Self::page_of(&matching, first, after)
    }

    async fn list_collection_members(
        &self,
        collection_id: &str,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<CollectionMember>> {
        let ids = self
            .collection_order(collection_id)
            .ok_or_else(|| CatalogError::NotFound(collection_id.to_string()))?;

        let members: Vec<CollectionMember> = {
            let products = self.products_guard();
            ids.iter()
                .filter_map(|id| products.iter().find(|p| &p.id == id))
                .map(CollectionMember::from)
                .collect()
        };
        Self::page_of(&members, first, after)
    }

    async fn update_product(&self, update: &ProductUpdate) -> CatalogResult<MutationResult<()>> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        *self
            .calls_guard()
            .updates
            .entry(update.id.clone())
            .or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        {
            let mut faults = self.faults_guard();
            if let Some(remaining) = faults.rate_limits.get_mut(&update.id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CatalogError::RateLimited { retry_after: None });
                }
            }
            if faults.broken.contains(&update.id) {
                return Err(CatalogError::Transport("connection refused".to_string()));
            }
            if faults.rejected.contains(&update.id) {
                return Ok(MutationResult::Rejected(vec![FieldError {
                    field: vec!["id".to_string()],
                    message: "Product cannot be updated".to_string(),
                }]));
            }
        }

        self.apply_update(update)?;
        self.calls_guard().applied_updates.push(update.clone());
        Ok(MutationResult::Applied(()))
    }

    async fn set_collection_sort_mode(
        &self,
        collection_id: &str,
        mode: SortMode,
    ) -> CatalogResult<MutationResult<()>> {
        if self.faults_guard().sort_mode_rejected.contains(collection_id) {
            return Ok(MutationResult::Rejected(vec![FieldError::new(
                "Sort order cannot be changed",
            )]));
        }

        let mut collections = self.collections_guard();
        let collection = collections
            .get_mut(collection_id)
            .ok_or_else(|| CatalogError::NotFound(collection_id.to_string()))?;
        collection.sort_mode = mode;
        Ok(MutationResult::Applied(()))
    }

    async fn reorder_collection(
        &self,
        collection_id: &str,
        moves: &[CollectionMove],
    ) -> CatalogResult<MutationResult<Option<String>>> {
        let chunk_index = {
            let mut calls = self.calls_guard();
            let chunks = calls
                .reorder_chunks
                .entry(collection_id.to_string())
                .or_default();
            chunks.push(moves.len());
            chunks.len() - 1
        };

        if let Some(&from) = self.faults_guard().reorder_rejected_from.get(collection_id) {
            if chunk_index >= from {
                return Ok(MutationResult::Rejected(vec![FieldError {
                    field: vec!["moves".to_string()],
                    message: "Invalid move".to_string(),
                }]));
            }
        }

        let mut collections = self.collections_guard();
        let collection = collections
            .get_mut(collection_id)
            .ok_or_else(|| CatalogError::NotFound(collection_id.to_string()))?;
        if collection.sort_mode != SortMode::Manual {
            return Ok(MutationResult::Rejected(vec![FieldError::new(
                "Collection is not manually sorted",
            )]));
        }

        for m in moves {
            if let Some(from) = collection.members.iter().position(|id| id == &m.id) {
                let id = collection.members.remove(from);
                let to = m.position.saturating_sub(1).min(collection.members.len());
                collection.members.insert(to, id);
            }
        }

        Ok(MutationResult::Applied(Some(format!(
            "gid://shopify/Job/{collection_id}-{chunk_index}"
        ))))
    }

    async fn count_products(&self, query: &ProductQuery) -> CatalogResult<u64> {
        if self.faults_guard().fail_counts {
            return Err(CatalogError::Transport("connection reset".to_string()));
        }
        Ok(self
            .products_guard()
            .iter()
            .filter(|p| query.matches(p))
            .count() as u64)
    }
}
