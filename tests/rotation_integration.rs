//! End-to-end rotation runs against the in-memory catalog
//!
//! These tests verify the complete workflow of:
//! - Lock contention and dropped ticks
//! - Weighted selection quotas
//! - Throttled writes and the retry budget
//! - Next-run marker and collection reorder follow-ups

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{fast_settings, products, scheduler};
use shelf_rotation::catalog::{MemoryCatalog, StateStore};
use shelf_rotation::models::{CategoryTag, Product, ProductStatus};
use shelf_rotation::rotation::{FetchOptions, SelectionMode};
use shelf_rotation::scheduler::{CollectionOutcome, CronTrigger, RunLock, RunState, TriggerConfig};

const MARKER: &str = "gid://shopify/Metaobject/1";

// ============================================================================
// Lock
// ============================================================================

#[tokio::test]
async fn test_tick_dropped_while_running() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 5, ProductStatus::Draft, "new")));
    let (scheduler, store) = scheduler(catalog.clone(), fast_settings(10));

    let held = scheduler.lock().try_acquire();
    assert!(held.is_some());

    assert!(scheduler.tick().await.is_skipped());
    assert_eq!(catalog.list_page_calls(), 0);
    assert_eq!(catalog.total_update_calls(), 0);
    assert_eq!(store.write_count().await, 0);
    assert_eq!(scheduler.lock().state(), RunState::Running);

    drop(held);
    assert_eq!(scheduler.lock().state(), RunState::Idle);
    assert!(scheduler.tick().await.completed().is_some());
}

#[tokio::test]
async fn test_lock_released_after_run() {
    let catalog = Arc::new(MemoryCatalog::default());
    let (scheduler, _) = scheduler(catalog, fast_settings(10));

    assert!(scheduler.tick().await.completed().is_some());
    assert!(!scheduler.lock().is_running());
    assert!(scheduler.tick().await.completed().is_some());
}

#[test]
fn test_independent_locks() {
    let rotation = RunLock::new();
    let sweep = RunLock::new();

    let _guard = rotation.try_acquire();
    assert!(rotation.try_acquire().is_none());
    assert!(sweep.try_acquire().is_some());
}

// ============================================================================
// Selection and payload
// ============================================================================

#[tokio::test]
async fn test_rotation_swaps_active_set() {
    let mut all = products("a", 6, ProductStatus::Active, "used");
    all.extend(products("d", 20, ProductStatus::Draft, "new"));
    let catalog = Arc::new(MemoryCatalog::new(all));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(8));

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.fetched, 26);
    assert!(report.fetch_complete);
    assert_eq!(report.deselected.len(), 6);
    assert_eq!(report.target, 8);
    assert_eq!(report.selected.len(), 8);

    let deactivated: HashSet<&String> = report.deselected.iter().collect();
    assert!(report.selected.iter().all(|id| !deactivated.contains(id)));

    for id in &report.deselected {
        assert_eq!(catalog.product(id).unwrap().status, ProductStatus::Draft);
    }
    for id in &report.selected {
        assert_eq!(catalog.product(id).unwrap().status, ProductStatus::Active);
    }

    let active_now = catalog
        .products()
        .iter()
        .filter(|p| p.status == ProductStatus::Active)
        .count();
    assert_eq!(active_now, 8);
}

#[tokio::test]
async fn test_deactivations_submitted_first() {
    let mut all = products("a", 3, ProductStatus::Active, "new");
    all.extend(products("d", 3, ProductStatus::Draft, "new"));
    let catalog = Arc::new(MemoryCatalog::new(all));
    let mut settings = fast_settings(3);
    settings.batch.concurrency = 1;
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    scheduler.tick().await.completed().unwrap();

    let statuses: Vec<Option<ProductStatus>> =
        catalog.applied_updates().iter().map(|u| u.status).collect();
    assert_eq!(
        statuses,
        vec![
            Some(ProductStatus::Draft),
            Some(ProductStatus::Draft),
            Some(ProductStatus::Draft),
            Some(ProductStatus::Active),
            Some(ProductStatus::Active),
            Some(ProductStatus::Active),
        ]
    );
}

#[tokio::test]
async fn test_weighted_quotas_with_ample_pool() {
    let mut all = products("n", 100, ProductStatus::Draft, "new");
    all.extend(products("s", 50, ProductStatus::Draft, "slightly-used"));
    all.extend(products("u", 10, ProductStatus::Draft, "used"));
    let catalog = Arc::new(MemoryCatalog::new(all));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(40));

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.target, 40);
    assert_eq!(report.selected.len(), 40);

    let unique: HashSet<&String> = report.selected.iter().collect();
    assert_eq!(unique.len(), 40);

    let count = |category: CategoryTag| {
        report
            .selected
            .iter()
            .filter(|id| catalog.product(id).unwrap().category() == Some(category))
            .count()
    };
    assert_eq!(count(CategoryTag::New), 20);
    assert_eq!(count(CategoryTag::SlightlyUsed), 12);
    assert_eq!(count(CategoryTag::Used), 8);
}

#[tokio::test]
async fn test_target_capped_by_draft_pool() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 5, ProductStatus::Draft, "new")));
    let (scheduler, _) = scheduler(catalog, fast_settings(3000));

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.target, 5);
    assert_eq!(report.selected.len(), 5);
}

#[tokio::test]
async fn test_excluded_drafts_never_activated() {
    let mut all = products("d", 4, ProductStatus::Draft, "new");
    all.push(Product::new("parked", ProductStatus::Draft).with_tags(["new", "no-rotation"]));
    let catalog = Arc::new(MemoryCatalog::new(all));
    let mut settings = fast_settings(10);
    settings.exclude_tags = vec!["no-rotation".to_string()];
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.draft, 5);
    assert_eq!(report.candidates, 4);
    assert!(!report.selected.contains(&"parked".to_string()));
    assert_eq!(catalog.product("parked").unwrap().status, ProductStatus::Draft);
}

#[tokio::test]
async fn test_fifo_selection_takes_catalog_order() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 6, ProductStatus::Draft, "")));
    let mut settings = fast_settings(3);
    settings.selection = SelectionMode::Fifo;
    let (scheduler, _) = scheduler(catalog, settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.selected, vec!["d0", "d1", "d2"]);
}

#[tokio::test]
async fn test_assignment_counter_incremented() {
    let catalog = Arc::new(MemoryCatalog::new(vec![
        Product::new("seen", ProductStatus::Draft)
            .with_tags(["new"])
            .with_assignment_count(3),
        Product::new("fresh", ProductStatus::Draft).with_tags(["new"]),
        Product::new("zero", ProductStatus::Draft)
            .with_tags(["new"])
            .with_assignment_count(0),
    ]));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(10));

    scheduler.tick().await.completed().unwrap();
    assert_eq!(catalog.product("seen").unwrap().assignment_count, Some(4));
    assert_eq!(catalog.product("fresh").unwrap().assignment_count, Some(1));
    assert_eq!(catalog.product("zero").unwrap().assignment_count, Some(1));
}

#[tokio::test]
async fn test_deactivation_leaves_counter_untouched() {
    let catalog = Arc::new(MemoryCatalog::new(vec![Product::new("a", ProductStatus::Active)
        .with_tags(["new"])
        .with_assignment_count(7)]));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(10));

    scheduler.tick().await.completed().unwrap();
    let product = catalog.product("a").unwrap();
    assert_eq!(product.status, ProductStatus::Draft);
    assert_eq!(product.assignment_count, Some(7));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_throttled_item_retried_others_unaffected() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 10, ProductStatus::Draft, "")));
    catalog.rate_limit_product("d5", 1);
    let mut settings = fast_settings(10);
    settings.selection = SelectionMode::Fifo;
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.batch.updated.len(), 10);
    assert_eq!(report.batch.calls, 11);
    assert_eq!(catalog.update_calls("d5"), 2);
    for i in (0..10).filter(|&i| i != 5) {
        assert_eq!(catalog.update_calls(&format!("d{i}")), 1);
    }
}

#[tokio::test]
async fn test_exhausted_item_dropped_run_continues() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 4, ProductStatus::Draft, "")));
    catalog.rate_limit_product("d1", 100);
    let mut settings = fast_settings(4);
    settings.selection = SelectionMode::Fifo;
    settings.next_run_marker = Some(MARKER.to_string());
    let (scheduler, store) = scheduler(catalog.clone(), settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.batch.exhausted, vec!["d1".to_string()]);
    assert_eq!(report.batch.updated.len(), 3);
    // Initial attempt plus three retries
    assert_eq!(catalog.update_calls("d1"), 4);
    assert_eq!(catalog.product("d1").unwrap().status, ProductStatus::Draft);
    assert!(store.next_run(MARKER).await.unwrap().is_some());

    assert!(report.selected.contains(&"d1".to_string()));
    assert_eq!(report.activated(), vec!["d0", "d2", "d3"]);
}

#[tokio::test]
async fn test_fetch_failure_uses_partial_snapshot() {
    let mut all = products("d", 2, ProductStatus::Draft, "new");
    all.extend(products("late", 4, ProductStatus::Draft, "new"));
    let catalog = Arc::new(MemoryCatalog::new(all));
    catalog.fail_listing_at_page(1);
    let mut settings = fast_settings(10);
    settings.fetch = FetchOptions::new(2, Duration::ZERO);
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert!(!report.fetch_complete);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.candidates, 2);

    let mut activated = report.selected.clone();
    activated.sort();
    assert_eq!(activated, vec!["d0", "d1"]);
    for i in 0..4 {
        assert_eq!(catalog.update_calls(&format!("late{i}")), 0);
    }
}

#[tokio::test]
async fn test_empty_catalog_makes_no_writes() {
    let catalog = Arc::new(MemoryCatalog::default());
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(10));

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.batch.submitted(), 0);
    assert_eq!(catalog.total_update_calls(), 0);
}

// ============================================================================
// Follow-ups
// ============================================================================

#[tokio::test]
async fn test_next_run_marker_written() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 2, ProductStatus::Draft, "new")));
    let mut settings = fast_settings(10);
    settings.next_run_marker = Some(MARKER.to_string());
    settings.next_run_offset = chrono::Duration::minutes(2);
    let (scheduler, store) = scheduler(catalog, settings);

    let report = scheduler.tick().await.completed().unwrap();
    let stored = store.next_run(MARKER).await.unwrap();
    assert!(stored.is_some());
    assert_eq!(stored, report.next_run);
    assert_eq!(store.write_count().await, 1);

    let value = chrono::DateTime::parse_from_rfc3339(&stored.unwrap()).unwrap();
    assert!(value.with_timezone(&chrono::Utc) > report.started_at);
}

#[tokio::test]
async fn test_missing_marker_skips_write() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 2, ProductStatus::Draft, "new")));
    let (scheduler, store) = scheduler(catalog, fast_settings(10));

    let report = scheduler.tick().await.completed().unwrap();
    assert!(report.next_run.is_none());
    assert_eq!(store.write_count().await, 0);
}

#[tokio::test]
async fn test_collection_failure_does_not_block_others() {
    let mut all = vec![
        Product::new("u1", ProductStatus::Active).with_tags(["used"]),
        Product::new("n1", ProductStatus::Active).with_tags(["new"]),
    ];
    all.extend(products("d", 2, ProductStatus::Draft, "slightly-used"));
    let catalog = Arc::new(
        MemoryCatalog::new(all)
            .with_collection("c-bad", vec!["u1".into(), "n1".into()])
            .with_collection("c-good", vec!["u1".into(), "n1".into()]),
    );
    catalog.reject_sort_mode("c-bad");

    let mut settings = fast_settings(10);
    settings.collections = vec!["c-bad".to_string(), "c-good".to_string()];
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    let report = scheduler.tick().await.completed().unwrap();
    assert_eq!(report.collections.len(), 2);
    assert!(matches!(
        &report.collections[0],
        CollectionOutcome::Failed { collection_id, .. } if collection_id == "c-bad"
    ));
    assert!(report.collections[1].is_reordered());

    assert_eq!(
        catalog.collection_order("c-good").unwrap(),
        vec!["n1".to_string(), "u1".to_string()]
    );
    assert_eq!(
        catalog.collection_order("c-bad").unwrap(),
        vec!["u1".to_string(), "n1".to_string()]
    );
}

// ============================================================================
// Trigger
// ============================================================================

#[tokio::test]
async fn test_startup_fire_runs_rotation() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 3, ProductStatus::Draft, "new")));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(10));

    let trigger = CronTrigger::new(
        TriggerConfig::new("0 0 0 1 1 *", "UTC").with_run_on_startup(true),
    )
    .unwrap();
    let handle = trigger.spawn(Arc::new(scheduler));

    let mut waited = Duration::ZERO;
    while catalog.total_update_calls() < 3 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(catalog.total_update_calls(), 3);

    handle.stop().await.unwrap();
}

#[tokio::test]
async fn test_scheduled_fire_runs_rotation() {
    let catalog = Arc::new(MemoryCatalog::new(products("d", 3, ProductStatus::Draft, "new")));
    let (scheduler, _) = scheduler(catalog.clone(), fast_settings(10));

    // Every second, no startup fire
    let trigger = CronTrigger::new(TriggerConfig::new("* * * * * *", "UTC")).unwrap();
    let handle = trigger.spawn(Arc::new(scheduler));

    let mut waited = Duration::ZERO;
    while catalog.total_update_calls() < 3 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    handle.stop().await.unwrap();
    assert!(catalog.total_update_calls() >= 3);
    assert!(catalog.update_calls("d0") >= 1);
}

#[tokio::test]
async fn test_stop_lets_running_rotation_finish() {
    let mut all = products("a", 10, ProductStatus::Active, "used");
    all.extend(products("d", 10, ProductStatus::Draft, "new"));
    let catalog = Arc::new(MemoryCatalog::new(all).with_latency(Duration::from_millis(50)));
    let mut settings = fast_settings(10);
    settings.batch.concurrency = 1;
    let (scheduler, _) = scheduler(catalog.clone(), settings);

    let trigger = CronTrigger::new(
        TriggerConfig::new("0 0 0 1 1 *", "UTC").with_run_on_startup(true),
    )
    .unwrap();
    let handle = trigger.spawn(Arc::new(scheduler));

    while catalog.total_update_calls() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.stop().await.unwrap();

    assert_eq!(catalog.total_update_calls(), 20);
    let active: Vec<String> = catalog
        .products()
        .into_iter()
        .filter(|p| p.status == ProductStatus::Active)
        .map(|p| p.id)
        .collect();
    assert_eq!(active.len(), 10);
    assert!(active.iter().all(|id| id.starts_with('d')));
}
