//! GraphQL admin API client
//!
//! This module provides the HTTP implementation of [`CatalogApi`]:
//! - Rate limiting with governor, awaited before every request
//! - Access-token authentication
//! - Throttle detection from both HTTP 429 and `THROTTLED` error codes
//! - One decode step from JSON into typed models

use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, RETRY_AFTER},
    Client, Response,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, warn};

use super::graphql::{self, Envelope};
use super::{CatalogApi, CatalogResult};
use crate::models::{
    CollectionMember, CollectionMove, MutationResult, Page, Product, ProductQuery, ProductUpdate,
    SortMode,
};
use crate::utils::error::CatalogError;
use crate::utils::to_product_gid;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

/// Configuration for the admin client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full GraphQL endpoint URL
    pub endpoint: String,

    /// Admin API access token
    pub access_token: String,

    /// Maximum requests per second
    pub requests_per_second: u32,

    /// Request timeout
    pub timeout: Duration,

    /// Namespace of the assignment-count metafield
    pub assignment_namespace: String,

    /// Key of the assignment-count metafield
    pub assignment_key: String,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            requests_per_second: 2,
            timeout: Duration::from_secs(30),
            assignment_namespace: "custom".to_string(),
            assignment_key: "assign".to_string(),
        }
    }

    pub fn with_requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_assignment_metafield(
        mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.assignment_namespace = namespace.into();
        self.assignment_key = key.into();
        self
    }
}

/// Admin GraphQL client
pub struct AdminClient {
    config: ClientConfig,

    /// HTTP client with configured timeout and compression
    http: Client,

    /// Rate limiter to control request frequency
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl AdminClient {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Transport` if the HTTP client cannot be built
    /// or the access token is not a valid header value
    pub fn new(config: ClientConfig) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(&config.access_token)
            .map_err(|e| CatalogError::Transport(format!("invalid access token: {e}")))?;
        headers.insert(ACCESS_TOKEN_HEADER, token);

        let http = Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .default_headers(headers)
            .build()
            .map_err(|e| CatalogError::Transport(e.to_string()))?;

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self {
            config,
            http,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute a GraphQL document and decode its `data`
    ///
    /// # Errors
    ///
    /// - `RateLimited` on HTTP 429 or a `THROTTLED` error entry
    /// - `Status` on any other non-success HTTP status
    /// - `GraphQl` when the response carries top-level errors
    /// - `Decode` when `data` is missing or malformed
    pub async fn execute<D: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> CatalogResult<D> {
        self.rate_limiter.until_ready().await;

        let body = json!({ "query": query, "variables": variables });
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?;

        let envelope: Envelope<D> = Self::decode(response).await?;

        if !envelope.errors.is_empty() {
            if envelope.errors.iter().any(|e| e.is_throttled()) {
                return Err(CatalogError::RateLimited { retry_after: None });
            }
            return Err(CatalogError::GraphQl(
                envelope.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        envelope
            .data
            .ok_or_else(|| CatalogError::Decode("response carried no data".to_string()))
    }

    async fn decode<D: DeserializeOwned>(response: Response) -> CatalogResult<Envelope<D>> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(Duration::from_secs_f64);
            warn!(retry_after = ?retry_after, "Catalog API throttled request");
            return Err(CatalogError::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(CatalogError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn missing(field: &str) -> CatalogError {
        CatalogError::Decode(format!("response missing '{field}'"))
    }
}

/// Wire shape of a product update
fn product_input(update: &ProductUpdate) -> Value {
    let mut input = json!({ "id": to_product_gid(&update.id) });

    if let Some(status) = update.status {
        input["status"] = json!(status.as_str());
    }
    if let Some(tags) = &update.tags {
        input["tags"] = json!(tags.iter().collect::<Vec<_>>());
    }
    if !update.metafields.is_empty() {
        input["metafields"] = json!(update.metafields);
    }

    input
}

/// Wire shape of collection moves; positions go out zero-based
fn move_inputs(moves: &[CollectionMove]) -> Value {
    Value::Array(
        moves
            .iter()
            .map(|m| {
                json!({
                    "id": to_product_gid(&m.id),
                    "newPosition": m.position.saturating_sub(1).to_string(),
                })
            })
            .collect(),
    )
}

#[async_trait]
impl CatalogApi for AdminClient {
    async fn list_products(
        &self,
        query: &ProductQuery,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<Product>> {
        let variables = json!({
            "first": first,
            "after": after,
            "query": query.search_string(),
            "namespace": self.config.assignment_namespace,
            "key": self.config.assignment_key,
        });

        let data: graphql::ProductsData = self.execute(graphql::LIST_PRODUCTS, variables).await?;
        Ok(data.products.into_page())
    }

    async fn list_collection_members(
        &self,
        collection_id: &str,
        first: usize,
        after: Option<String>,
    ) -> CatalogResult<Page<CollectionMember>> {
        let variables = json!({ "id": collection_id, "first": first, "after": after });

        let data: graphql::CollectionData = self
            .execute(graphql::LIST_COLLECTION_MEMBERS, variables)
            .await?;

        data.collection
            .map(|c| c.products.into_page())
            .ok_or_else(|| CatalogError::NotFound(collection_id.to_string()))
    }

    async fn update_product(&self, update: &ProductUpdate) -> CatalogResult<MutationResult<()>> {
        let variables = json!({ "product": product_input(update) });

        let data: graphql::ProductUpdateData =
            self.execute(graphql::UPDATE_PRODUCT, variables).await?;
        let payload = data
            .product_update
            .ok_or_else(|| Self::missing("productUpdate"))?;

        debug!(product_id = %update.id, "Product update sent");
        Ok(MutationResult::from_errors(
            (),
            graphql::into_field_errors(payload.user_errors),
        ))
    }

    async fn set_collection_sort_mode(
        &self,
        collection_id: &str,
        mode: SortMode,
    ) -> CatalogResult<MutationResult<()>> {
        let variables = json!({ "input": { "id": collection_id, "sortOrder": mode.as_str() } });

        let data: graphql::CollectionUpdateData =
            self.execute(graphql::SET_SORT_ORDER, variables).await?;
        let payload = data
            .collection_update
            .ok_or_else(|| Self::missing("collectionUpdate"))?;

        Ok(MutationResult::from_errors(
            (),
            graphql::into_field_errors(payload.user_errors),
        ))
    }

    async fn reorder_collection(
        &self,
        collection_id: &str,
        moves: &[CollectionMove],
    ) -> CatalogResult<MutationResult<Option<String>>> {
        let variables = json!({ "id": collection_id, "moves": move_inputs(moves) });

        let data: graphql::ReorderData =
            self.execute(graphql::REORDER_COLLECTION, variables).await?;
        let payload = data
            .collection_reorder_products
            .ok_or_else(|| Self::missing("collectionReorderProducts"))?;

        Ok(MutationResult::from_errors(
            payload.job.map(|j| j.id),
            graphql::into_field_errors(payload.user_errors),
        ))
    }

    async fn count_products(&self, query: &ProductQuery) -> CatalogResult<u64> {
        let variables = json!({ "query": query.search_string() });

        let data: graphql::CountData = self.execute(graphql::COUNT_PRODUCTS, variables).await?;
        data.products_count
            .map(|c| c.count)
            .ok_or_else(|| Self::missing("productsCount"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetafieldInput, ProductStatus};
    use std::collections::BTreeSet;

    #[test]
    fn test_client_creation() {
        let client = AdminClient::new(ClientConfig::new("http://localhost/graphql", "token"));
        assert!(client.is_ok());
    }

    #[test]
    fn test_invalid_token_rejected() {
        let client = AdminClient::new(ClientConfig::new("http://localhost/graphql", "bad\ntoken"));
        assert!(matches!(client, Err(CatalogError::Transport(_))));
    }

    #[test]
    fn test_product_input_only_carries_changed_fields() {
        let update = ProductUpdate::new("42").status(ProductStatus::Draft);
        let input = product_input(&update);

        assert_eq!(input["id"], "gid://shopify/Product/42");
        assert_eq!(input["status"], "DRAFT");
        assert!(input.get("tags").is_none());
        assert!(input.get("metafields").is_none());
    }

    #[test]
    fn test_product_input_with_tags_and_metafield() {
        let tags: BTreeSet<String> = ["b", "a"].iter().map(|s| s.to_string()).collect();
        let update = ProductUpdate::new("gid://shopify/Product/1")
            .tags(tags)
            .metafield(MetafieldInput::integer("custom", "assign", 2));
        let input = product_input(&update);

        assert_eq!(input["tags"], json!(["a", "b"]));
        assert_eq!(input["metafields"][0]["type"], "number_integer");
        assert_eq!(input["metafields"][0]["value"], "2");
    }

    #[test]
    fn test_move_inputs_are_zero_based() {
        let moves = vec![
            CollectionMove { id: "1".into(), position: 1 },
            CollectionMove { id: "2".into(), position: 2 },
        ];
        let wire = move_inputs(&moves);
        assert_eq!(wire[0]["newPosition"], "0");
        assert_eq!(wire[1]["newPosition"], "1");
    }
}
