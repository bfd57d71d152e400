//! Common test utilities

use std::sync::Arc;
use std::time::Duration;

use shelf_rotation::catalog::{MemoryCatalog, MemoryStateStore};
use shelf_rotation::models::{Product, ProductStatus};
use shelf_rotation::rotation::{FetchOptions, SelectionMode};
use shelf_rotation::scheduler::{RotationScheduler, RotationSettings};

/// Rotation settings with every pause removed and a fixed seed
pub fn fast_settings(active_limit: usize) -> RotationSettings {
    let mut settings = RotationSettings {
        active_limit,
        selection: SelectionMode::Weighted,
        selection_seed: Some(42),
        ..RotationSettings::default()
    }
    .without_delays();
    settings.fetch = FetchOptions::new(50, Duration::ZERO);
    settings.sorter.fetch = FetchOptions::new(50, Duration::ZERO);
    settings
}

/// `n` products with ids `{prefix}{i}`, all with the same status and tag
pub fn products(prefix: &str, n: usize, status: ProductStatus, tag: &str) -> Vec<Product> {
    (0..n)
        .map(|i| {
            let product = Product::new(format!("{prefix}{i}"), status);
            if tag.is_empty() {
                product
            } else {
                product.with_tags([tag])
            }
        })
        .collect()
}

/// Scheduler wired to in-memory collaborators
#[allow(dead_code)]
pub fn scheduler(
    catalog: Arc<MemoryCatalog>,
    settings: RotationSettings,
) -> (RotationScheduler, Arc<MemoryStateStore>) {
    let store = Arc::new(MemoryStateStore::new());
    let scheduler = RotationScheduler::new(catalog, store.clone(), settings);
    (scheduler, store)
}
