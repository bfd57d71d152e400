//! Paginated fetcher
//!
//! Drains a cursor-paged listing into memory, one page at a time, with a
//! fixed pause between requests. Pages are never fetched in parallel.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::catalog::{CatalogApi, CatalogResult};
use crate::models::{CollectionMember, Page, Product, ProductQuery};
use crate::utils::error::CatalogError;
use crate::utils::pause;

/// A cursor-paged listing endpoint
#[async_trait]
pub trait PageSource: Send + Sync {
    type Item: Send;

    /// Request one page
    async fn page(&self, first: usize, after: Option<String>) -> CatalogResult<Page<Self::Item>>;

    /// Short label for log lines
    fn label(&self) -> String;
}

/// Products matching a query
pub struct ProductListing<'a> {
    api: &'a dyn CatalogApi,
    query: ProductQuery,
}

impl<'a> ProductListing<'a> {
    pub fn new(api: &'a dyn CatalogApi, query: ProductQuery) -> Self {
        Self { api, query }
    }
}

#[async_trait]
impl PageSource for ProductListing<'_> {
    type Item = Product;

    async fn page(&self, first: usize, after: Option<String>) -> CatalogResult<Page<Product>> {
        self.api.list_products(&self.query, first, after).await
    }

    fn label(&self) -> String {
        match self.query.search_string() {
            Some(q) => format!("products({q})"),
            None => "products".to_string(),
        }
    }
}

/// Members of one collection
pub struct CollectionListing<'a> {
    api: &'a dyn CatalogApi,
    collection_id: &'a str,
}

impl<'a> CollectionListing<'a> {
    pub fn new(api: &'a dyn CatalogApi, collection_id: &'a str) -> Self {
        Self { api, collection_id }
    }
}

#[async_trait]
impl PageSource for CollectionListing<'_> {
    type Item = CollectionMember;

    async fn page(
        &self,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<CollectionMember>> {
        self.api
            .list_collection_members(self.collection_id, first, after)
            .await
    }

    fn label(&self) -> String {
        format!("collection({})", self.collection_id)
    }
}

/// How a listing is walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    pub page_size: usize,
    /// Stop once this many items have been collected
    pub cap: Option<usize>,
    /// Pause between page requests
    pub page_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: 250,
            cap: None,
            page_delay: Duration::from_millis(100),
        }
    }
}

impl FetchOptions {
    pub fn new(page_size: usize, page_delay: Duration) -> Self {
        Self {
            page_size,
            cap: None,
            page_delay,
        }
    }

    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = Some(cap);
        self
    }
}

/// Accumulated result of a walk
#[derive(Debug)]
pub struct Fetched<T> {
    pub items: Vec<T>,
    /// False when a page request failed and the walk ended early
    pub complete: bool,
    /// Pages successfully received
    pub pages: usize,
    /// The page error that ended the walk
    pub error: Option<CatalogError>,
}

impl<T> Fetched<T> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Walk every page of `source`
///
/// Never fails: a page error ends the walk and whatever was accumulated is
/// returned with `complete = false`. With a cap, no page is requested once
/// the cap is reached and the final page's overshoot is truncated.
pub async fn fetch_all<S>(source: &S, options: &FetchOptions) -> Fetched<S::Item>
where
    S: PageSource + ?Sized,
{
    let label = source.label();
    let mut items: Vec<S::Item> = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;
    let mut complete = true;
    let mut error = None;

    loop {
        if options.cap.is_some_and(|cap| items.len() >= cap) {
            debug!(source = %label, collected = items.len(), "Fetch cap reached");
            break;
        }
        if pages > 0 {
            pause(options.page_delay).await;
        }

        let page = match source.page(options.page_size.max(1), cursor.take()).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    source = %label,
                    pages,
                    collected = items.len(),
                    error = %e,
                    "Page request failed, returning partial result"
                );
                complete = false;
                error = Some(e);
                break;
            }
        };

        pages += 1;
        items.extend(page.items);
        debug!(source = %label, page = pages, collected = items.len(), "Fetched page");

        if !page.page_info.has_next_page {
            break;
        }
        match page.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                warn!(source = %label, pages, "Listing reported more pages without a cursor");
                complete = false;
                break;
            }
        }
    }

    if let Some(cap) = options.cap {
        items.truncate(cap);
    }

    Fetched {
        items,
        complete,
        pages,
        error,
    }
}
