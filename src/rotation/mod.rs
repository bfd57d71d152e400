//! Rotation engine building blocks
//!
//! Leaf to root:
//!
//! - [`fetch`] - drains cursor-paged listings with a per-page delay
//! - [`mutator`] - minimal-diff tag/status writes in batches
//! - [`selection`] - weighted 50/30/20 draft selection
//! - [`batch`] - bounded worker pool with retry on throttling
//! - [`sorter`] - collection ordering by tag priority and recency
//!
//! The scheduler in [`crate::scheduler`] wires these together.

pub mod batch;
pub mod fetch;
pub mod mutator;
pub mod selection;
pub mod sorter;

pub use batch::{BatchConfig, BatchReport, BatchUpdater};
pub use fetch::{fetch_all, CollectionListing, FetchOptions, Fetched, PageSource, ProductListing};
pub use mutator::{MutatorConfig, TagMutation, TagMutator};
pub use selection::{select_activation, select_deactivation, target_count, Quotas, SelectionMode};
pub use sorter::{rank_members, CollectionSorter, ReorderReport, SortError, SorterConfig};
