//! External collaborators of the rotation engine
//!
//! The engine talks to exactly two things:
//!
//! - a [`CatalogApi`]: paginated reads of products and collection members,
//!   per-product writes, and collection sort/reorder mutations
//! - a [`StateStore`]: one persisted "next run" marker
//!
//! # Implementations
//!
//! - [`client::AdminClient`] - GraphQL over HTTP with rate limiting
//! - [`state::MetaobjectStateStore`] - marker kept in a metaobject field
//! - [`memory::MemoryCatalog`] / [`state::MemoryStateStore`] - in-process,
//!   used by tests and local dry runs

pub mod client;
pub mod graphql;
pub mod memory;
pub mod state;

use async_trait::async_trait;

use crate::models::{
    CollectionMember, CollectionMove, MutationResult, Page, Product, ProductQuery, ProductUpdate,
    SortMode,
};
use crate::utils::error::{CatalogError, StateError};

pub use client::{AdminClient, ClientConfig};
pub use memory::MemoryCatalog;
pub use state::{MemoryStateStore, MetaobjectStateStore};

/// Result type for catalog calls
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Paginated, rate-limited product catalog
///
/// Every method is a suspension point and may fail at the transport level
/// or with [`CatalogError::RateLimited`]. Mutations additionally report
/// field errors through [`MutationResult::Rejected`].
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// One page of products matching `query`
    async fn list_products(
        &self,
        query: &ProductQuery,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<Product>>;

    /// One page of a collection's members
    async fn list_collection_members(
        &self,
        collection_id: &str,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<CollectionMember>>;

    /// Write status, tags and/or metafields of a single product
    async fn update_product(&self, update: &ProductUpdate) -> CatalogResult<MutationResult<()>>;

    /// Change how a collection orders its members
    async fn set_collection_sort_mode(
        &self,
        collection_id: &str,
        mode: SortMode,
    ) -> CatalogResult<MutationResult<()>>;

    /// Move members to absolute positions; returns the async job id if any
    async fn reorder_collection(
        &self,
        collection_id: &str,
        moves: &[CollectionMove],
    ) -> CatalogResult<MutationResult<Option<String>>>;

    /// Number of products matching `query`
    async fn count_products(&self, query: &ProductQuery) -> CatalogResult<u64>;
}

/// Persisted next-run marker
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Overwrite the marker value
    async fn set_next_run(&self, marker: &str, value: &str) -> Result<(), StateError>;

    /// Current marker value, if one has been written
    async fn next_run(&self, marker: &str) -> Result<Option<String>, StateError>;
}
