//! Collection sorter
//!
//! Recomputes a collection's full member order: `new`, then `slightly-used`,
//! then `used`, each newest first, with untagged members kept in their
//! existing relative order at the end. Positions are written in bounded
//! chunks after switching the collection to manual sorting.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::fetch::{fetch_all, CollectionListing, FetchOptions};
use crate::catalog::CatalogApi;
use crate::models::{CollectionMember, CollectionMove, FieldError, MutationResult, SortMode};
use crate::utils::error::CatalogError;

/// Largest number of moves the catalog accepts per reorder call
pub const MAX_MOVES_PER_CALL: usize = 250;

/// Errors that stop a collection reorder
#[derive(Error, Debug)]
pub enum SortError {
    /// Member listing ended early; positions would be wrong
    #[error("Member listing for {collection_id} incomplete after {fetched} items")]
    IncompleteFetch {
        collection_id: String,
        fetched: usize,
    },

    /// Switching to manual sort was rejected
    #[error("Manual sort rejected for {collection_id}: {}", join(.errors))]
    SortModeRejected {
        collection_id: String,
        errors: Vec<FieldError>,
    },

    /// Reorder chunk was rejected; earlier chunks stay applied
    #[error("Reorder chunk {chunk} rejected for {collection_id}: {}", join(.errors))]
    ChunkRejected {
        collection_id: String,
        chunk: usize,
        applied_chunks: usize,
        errors: Vec<FieldError>,
    },

    /// Catalog call failed
    #[error("Catalog call failed for {collection_id}: {source}")]
    Catalog {
        collection_id: String,
        #[source]
        source: CatalogError,
    },
}

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SortError {
    fn catalog(collection_id: &str, source: CatalogError) -> Self {
        Self::Catalog {
            collection_id: collection_id.to_string(),
            source,
        }
    }
}

/// Result of a successful reorder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReorderReport {
    pub collection_id: String,
    pub members: usize,
    pub chunks: usize,
    /// Async job ids returned by the catalog
    pub job_ids: Vec<String>,
}

/// Order members by category rank, newest first inside each group
pub fn rank_members(members: Vec<CollectionMember>) -> Vec<CollectionMember> {
    let mut groups: [Vec<CollectionMember>; 4] = Default::default();
    for member in members {
        let slot = member.category().map_or(3, |c| c.rank());
        groups[slot].push(member);
    }
    for group in groups.iter_mut().take(3) {
        group.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }
    groups.into_iter().flatten().collect()
}

/// Absolute 1-based positions for a ranked member list
pub fn positions(ranked: &[CollectionMember]) -> Vec<CollectionMove> {
    ranked
        .iter()
        .enumerate()
        .map(|(i, m)| CollectionMove {
            id: m.id.clone(),
            position: i + 1,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SorterConfig {
    pub chunk_size: usize,
    pub fetch: FetchOptions,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            chunk_size: MAX_MOVES_PER_CALL,
            fetch: FetchOptions::default(),
        }
    }
}

pub struct CollectionSorter<'a> {
    api: &'a dyn CatalogApi,
    config: SorterConfig,
}

impl<'a> CollectionSorter<'a> {
    pub fn new(api: &'a dyn CatalogApi, config: SorterConfig) -> Self {
        Self { api, config }
    }

    /// Recompute and write the order of one collection
    pub async fn reorder(&self, collection_id: &str) -> Result<ReorderReport, SortError> {
        let listing = CollectionListing::new(self.api, collection_id);
        let fetched = fetch_all(&listing, &self.config.fetch).await;
        if !fetched.complete {
            if fetched.pages == 0 {
                if let Some(source) = fetched.error {
                    return Err(SortError::catalog(collection_id, source));
                }
            }
            return Err(SortError::IncompleteFetch {
                collection_id: collection_id.to_string(),
                fetched: fetched.items.len(),
            });
        }

        let members = fetched.items.len();
        let mut report = ReorderReport {
            collection_id: collection_id.to_string(),
            members,
            ..ReorderReport::default()
        };
        if members == 0 {
            debug!(collection_id, "Collection is empty, nothing to reorder");
            return Ok(report);
        }

        match self
            .api
            .set_collection_sort_mode(collection_id, SortMode::Manual)
            .await
        {
            Ok(MutationResult::Applied(())) => {}
            Ok(MutationResult::Rejected(errors)) => {
                return Err(SortError::SortModeRejected {
                    collection_id: collection_id.to_string(),
                    errors,
                })
            }
            Err(e) => return Err(SortError::catalog(collection_id, e)),
        }

        let moves = positions(&rank_members(fetched.items));
        let chunk_size = self.config.chunk_size.clamp(1, MAX_MOVES_PER_CALL);

        for (index, chunk) in moves.chunks(chunk_size).enumerate() {
            match self.api.reorder_collection(collection_id, chunk).await {
                Ok(MutationResult::Applied(job)) => {
                    report.chunks += 1;
                    report.job_ids.extend(job);
                    debug!(
                        collection_id,
                        chunk = index + 1,
                        moves = chunk.len(),
                        "Reorder chunk applied"
                    );
                }
                Ok(MutationResult::Rejected(errors)) => {
                    warn!(collection_id, chunk = index + 1, "Reorder chunk rejected, stopping");
                    return Err(SortError::ChunkRejected {
                        collection_id: collection_id.to_string(),
                        chunk: index + 1,
                        applied_chunks: report.chunks,
                        errors,
                    });
                }
                Err(e) => return Err(SortError::catalog(collection_id, e)),
            }
        }

        info!(collection_id, members, chunks = report.chunks, "Collection reordered");
        Ok(report)
    }
}
