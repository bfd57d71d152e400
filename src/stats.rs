//! Dashboard statistics
//!
//! Product counts by status and category tag, the stored next-run marker,
//! and capacity. Collection never fails: any collaborator error degrades the
//! whole snapshot to zeros.

use serde::Serialize;
use tracing::warn;

use crate::catalog::{CatalogApi, StateStore};
use crate::models::{CategoryTag, ProductQuery, ProductStatus};
use crate::utils::error::StateError;

/// Counts for one status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub total: u64,
    pub new: u64,
    pub slightly_used: u64,
    pub used: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capacity {
    pub active_limit: usize,
    pub current_active: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub next_run_at: Option<String>,
    pub active: CategoryCounts,
    pub drafts: CategoryCounts,
    pub capacity: Capacity,
}

impl DashboardStats {
    /// All-zero snapshot
    pub fn empty(active_limit: usize) -> Self {
        Self {
            capacity: Capacity {
                active_limit,
                current_active: 0,
            },
            ..Self::default()
        }
    }
}

async fn counts(api: &dyn CatalogApi, status: ProductStatus) -> Result<CategoryCounts, StateError> {
    let base = ProductQuery::with_status(status);
    let mut counts = CategoryCounts {
        total: api.count_products(&base).await?,
        ..CategoryCounts::default()
    };

    for category in CategoryTag::all() {
        let n = api.count_products(&base.clone().tagged(category.tag())).await?;
        match category {
            CategoryTag::New => counts.new = n,
            CategoryTag::SlightlyUsed => counts.slightly_used = n,
            CategoryTag::Used => counts.used = n,
        }
    }
    Ok(counts)
}

async fn try_collect(
    api: &dyn CatalogApi,
    store: &dyn StateStore,
    marker: Option<&str>,
    active_limit: usize,
) -> Result<DashboardStats, StateError> {
    let next_run_at = match marker {
        Some(marker) => store.next_run(marker).await?,
        None => None,
    };
    let active = counts(api, ProductStatus::Active).await?;
    let drafts = counts(api, ProductStatus::Draft).await?;

    Ok(DashboardStats {
        next_run_at,
        active,
        drafts,
        capacity: Capacity {
            active_limit,
            current_active: active.total,
        },
    })
}

/// Gather dashboard statistics
pub async fn collect(
    api: &dyn CatalogApi,
    store: &dyn StateStore,
    marker: Option<&str>,
    active_limit: usize,
) -> DashboardStats {
    match try_collect(api, store, marker, active_limit).await {
        Ok(stats) => stats,
        Err(e) => {
            warn!(error = %e, "Dashboard stats unavailable, reporting zeros");
            DashboardStats::empty(active_limit)
        }
    }
}
