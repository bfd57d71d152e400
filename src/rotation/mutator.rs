//! Tag mutator
//!
//! Applies a declarative tag/status change to a set of products, writing
//! only those whose state actually changes. Writes are issued in fixed-size
//! batches; inside a batch at most `concurrency` run at once.

use futures::future::join_all;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::catalog::CatalogApi;
use crate::models::{MutationResult, Product, ProductStatus, ProductUpdate, StatusFilter};
use crate::utils::{pause, truncate_text};

/// The change to apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMutation {
    /// Tags to add when absent
    pub add_tags: BTreeSet<String>,
    /// Status to move products to
    pub new_status: Option<ProductStatus>,
    /// Tag removed before adding
    pub replace_tag: Option<String>,
    /// Only products with a matching status are considered
    pub filter: StatusFilter,
}

impl TagMutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tag(mut self, tag: impl Into<String>) -> Self {
        let tag = tag.into().trim().to_string();
        if !tag.is_empty() {
            self.add_tags.insert(tag);
        }
        self
    }

    pub fn status(mut self, status: ProductStatus) -> Self {
        self.new_status = Some(status);
        self
    }

    pub fn replace(mut self, tag: impl Into<String>) -> Self {
        self.replace_tag = Some(tag.into());
        self
    }

    pub fn filter(mut self, filter: StatusFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Compute the write for one product, or `None` when nothing changes
    pub fn plan(&self, product: &Product) -> Option<(ProductUpdate, Product)> {
        if !self.filter.matches(product.status) {
            return None;
        }

        let mut tags = product.tags.clone();
        match &self.replace_tag {
            Some(replace) => {
                let replace = replace.trim();
                tags.retain(|t| !t.eq_ignore_ascii_case(replace));
            }
            None => {
                let all_present = self.add_tags.iter().all(|t| product.has_tag(t));
                if all_present && self.new_status.is_none() {
                    return None;
                }
            }
        }
        for tag in &self.add_tags {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                tags.insert(tag.clone());
            }
        }

        let tags_changed = tags != product.tags;
        let status_changed = self.new_status.is_some_and(|s| s != product.status);
        if !tags_changed && !status_changed {
            return None;
        }

        let mut update = ProductUpdate::new(product.id.clone()).tags(tags.clone());
        let mut updated = product.clone();
        updated.tags = tags;
        if let Some(status) = self.new_status {
            update = update.status(status);
            updated.status = status;
        }

        Some((update, updated))
    }
}

/// Pacing of mutator writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutatorConfig {
    pub batch_size: usize,
    pub concurrency: usize,
    pub inter_batch_delay: Duration,
    /// Pause between concurrency chunks inside a batch
    pub inter_chunk_delay: Duration,
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            concurrency: 1,
            inter_batch_delay: Duration::from_millis(150),
            inter_chunk_delay: Duration::ZERO,
        }
    }
}

/// Issues planned tag/status writes against the catalog
pub struct TagMutator<'a> {
    api: &'a dyn CatalogApi,
    config: MutatorConfig,
}

impl<'a> TagMutator<'a> {
    pub fn new(api: &'a dyn CatalogApi, config: MutatorConfig) -> Self {
        Self { api, config }
    }

    /// Apply `mutation` and return the products that were actually changed
    ///
    /// Products rejected with field errors or hit by a transport failure are
    /// logged and left out of the result. Result order is unspecified.
    pub async fn apply(&self, products: &[Product], mutation: &TagMutation) -> Vec<Product> {
        let planned: Vec<(ProductUpdate, Product)> =
            products.iter().filter_map(|p| mutation.plan(p)).collect();
        let skipped = products.len() - planned.len();

        if planned.is_empty() {
            debug!(considered = products.len(), "No product needs a tag change");
            return Vec::new();
        }

        let batch_size = self.config.batch_size.max(1);
        let concurrency = self.config.concurrency.max(1);
        let batches = planned.len().div_ceil(batch_size);
        let mut changed = Vec::with_capacity(planned.len());

        for (index, batch) in planned.chunks(batch_size).enumerate() {
            let chunks = batch.len().div_ceil(concurrency);
            for (chunk_index, chunk) in batch.chunks(concurrency).enumerate() {
                let writes = chunk
                    .iter()
                    .map(|(update, product)| self.write(update, product));
                let results = join_all(writes).await;
                changed.extend(results.into_iter().flatten());

                if chunk_index + 1 < chunks {
                    pause(self.config.inter_chunk_delay).await;
                }
            }

            debug!(batch = index + 1, batches, changed = changed.len(), "Mutator batch done");
            if index + 1 < batches {
                pause(self.config.inter_batch_delay).await;
            }
        }

        info!(
            considered = products.len(),
            planned = planned.len(),
            skipped,
            changed = changed.len(),
            "Tag mutation applied"
        );
        changed
    }

    async fn write(&self, update: &ProductUpdate, product: &Product) -> Option<Product> {
        match self.api.update_product(update).await {
            Ok(MutationResult::Applied(())) => Some(product.clone()),
            Ok(MutationResult::Rejected(errors)) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                warn!(
                    product_id = %update.id,
                    title = %truncate_text(&product.title, 60),
                    errors = ?messages,
                    "Tag update rejected"
                );
                None
            }
            Err(e) => {
                warn!(product_id = %update.id, error = %e, "Tag update failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;

    fn fast() -> MutatorConfig {
        MutatorConfig {
            batch_size: 2,
            concurrency: 2,
            inter_batch_delay: Duration::ZERO,
            inter_chunk_delay: Duration::ZERO,
        }
    }

    fn draft(id: &str, tags: &[&str]) -> Product {
        Product::new(id, ProductStatus::Draft).with_tags(tags.iter().copied())
    }

    #[test]
    fn test_plan_skips_when_tags_present_and_no_status() {
        let mutation = TagMutation::new().add_tag("b").add_tag("a");
        assert!(mutation.plan(&draft("1", &["a", "b"])).is_none());
        assert!(mutation.plan(&draft("1", &["B", "A"])).is_none());
    }

    #[test]
    fn test_plan_adds_missing_tags() {
        let mutation = TagMutation::new().add_tag("nextproducts");
        let (update, updated) = mutation.plan(&draft("1", &["new"])).unwrap();

        let tags = update.tags.unwrap();
        assert!(tags.contains("new") && tags.contains("nextproducts"));
        assert_eq!(update.status, None);
        assert_eq!(updated.tags, tags);
    }

    #[test]
    fn test_plan_replace_removes_tag() {
        let mutation = TagMutation::new().replace("no-rotation");
        let (update, _) = mutation.plan(&draft("1", &["new", "No-Rotation"])).unwrap();
        assert_eq!(update.tags.unwrap().into_iter().collect::<Vec<_>>(), vec!["new"]);

        assert!(mutation.plan(&draft("2", &["new"])).is_none());
    }

    #[test]
    fn test_plan_status_change_only() {
        let mutation = TagMutation::new().status(ProductStatus::Active);
        let (update, updated) = mutation.plan(&draft("1", &["new"])).unwrap();
        assert_eq!(update.status, Some(ProductStatus::Active));
        assert_eq!(updated.status, ProductStatus::Active);

        let active = Product::new("2", ProductStatus::Active);
        assert!(mutation.plan(&active).is_none());
    }

    #[test]
    fn test_plan_respects_filter() {
        let mutation = TagMutation::new()
            .add_tag("x")
            .filter(StatusFilter::Active);
        assert!(mutation.plan(&draft("1", &[])).is_none());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let catalog = MemoryCatalog::new(vec![draft("1", &["new"]), draft("2", &[])]);
        let mutator = TagMutator::new(&catalog, fast());
        let mutation = TagMutation::new().add_tag("currentproducts");

        let first = mutator.apply(&catalog.products(), &mutation).await;
        assert_eq!(first.len(), 2);
        assert_eq!(catalog.total_update_calls(), 2);

        let second = mutator.apply(&catalog.products(), &mutation).await;
        assert!(second.is_empty());
        assert_eq!(catalog.total_update_calls(), 2);
    }

    #[tokio::test]
    async fn test_apply_drops_rejected_and_failed() {
        let products = vec![draft("1", &[]), draft("2", &[]), draft("3", &[])];
        let catalog = MemoryCatalog::new(products.clone());
        catalog.reject_product("2");
        catalog.break_product("3");
        let mutator = TagMutator::new(&catalog, fast());

        let changed = mutator
            .apply(&products, &TagMutation::new().add_tag("x"))
            .await;
        let ids: Vec<_> = changed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1"]);
        // Rejections are not retried
        assert_eq!(catalog.update_calls("2"), 1);
    }

    #[tokio::test]
    async fn test_apply_respects_concurrency() {
        let products: Vec<Product> = (0..8).map(|i| draft(&i.to_string(), &[])).collect();
        let catalog =
            MemoryCatalog::new(products.clone()).with_latency(Duration::from_millis(10));
        let config = MutatorConfig {
            batch_size: 4,
            concurrency: 2,
            ..fast()
        };

        let changed = TagMutator::new(&catalog, config)
            .apply(&products, &TagMutation::new().add_tag("x"))
            .await;
        assert_eq!(changed.len(), 8);
        assert!(catalog.max_concurrent_updates() <= 2);
    }
}
