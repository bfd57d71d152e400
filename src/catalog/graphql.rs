//! GraphQL documents and wire shapes for the admin API
//!
//! Response structs mirror the JSON exactly; conversion into [`crate::models`]
//! happens in the `into_*` helpers so malformed payloads fail in one place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    normalize_tags, parse_assignment_count, CollectionMember, FieldError, Page, PageInfo, Product,
    ProductStatus,
};

// ============================================================================
// Documents
// ============================================================================

pub const LIST_PRODUCTS: &str = r#"
query listProducts($first: Int!, $after: String, $query: String, $namespace: String!, $key: String!) {
  products(first: $first, after: $after, query: $query) {
    edges {
      node {
        id
        title
        status
        tags
        createdAt
        metafield(namespace: $namespace, key: $key) { value }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}"#;

pub const LIST_COLLECTION_MEMBERS: &str = r#"
query collectionMembers($id: ID!, $first: Int!, $after: String) {
  collection(id: $id) {
    products(first: $first, after: $after) {
      edges { node { id tags createdAt } }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#;

pub const UPDATE_PRODUCT: &str = r#"
mutation updateProduct($product: ProductUpdateInput!) {
  productUpdate(product: $product) {
    product { id }
    userErrors { field message }
  }
}"#;

pub const SET_SORT_ORDER: &str = r#"
mutation setCollectionSortOrder($input: CollectionInput!) {
  collectionUpdate(input: $input) {
    collection { id sortOrder }
    userErrors { field message }
  }
}"#;

pub const REORDER_COLLECTION: &str = r#"
mutation reorderCollection($id: ID!, $moves: [MoveInput!]!) {
  collectionReorderProducts(id: $id, moves: $moves) {
    job { id }
    userErrors { field message }
  }
}"#;

pub const COUNT_PRODUCTS: &str = r#"
query countProducts($query: String) {
  productsCount(query: $query) { count }
}"#;

pub const READ_METAOBJECT: &str = r#"
query readMetaobject($id: ID!) {
  metaobject(id: $id) {
    fields { key value }
  }
}"#;

pub const UPDATE_METAOBJECT: &str = r#"
mutation updateMetaobject($id: ID!, $metaobject: MetaobjectUpdateInput!) {
  metaobjectUpdate(id: $id, metaobject: $metaobject) {
    metaobject { id }
    userErrors { field message }
  }
}"#;

// ============================================================================
// Envelope
// ============================================================================

/// Top-level GraphQL response
#[derive(Debug, Deserialize)]
pub struct Envelope<D> {
    pub data: Option<D>,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    #[serde(default)]
    pub extensions: Option<ErrorExtensions>,
}

#[derive(Debug, Deserialize)]
pub struct ErrorExtensions {
    pub code: Option<String>,
}

impl ErrorEntry {
    pub fn is_throttled(&self) -> bool {
        self.extensions
            .as_ref()
            .and_then(|e| e.code.as_deref())
            .is_some_and(|code| code.eq_ignore_ascii_case("THROTTLED"))
    }
}

#[derive(Debug, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

pub fn into_field_errors(errors: Vec<UserError>) -> Vec<FieldError> {
    errors
        .into_iter()
        .map(|e| FieldError {
            field: e.field.unwrap_or_default(),
            message: e.message,
        })
        .collect()
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<N> {
    pub edges: Vec<Edge<N>>,
    pub page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
pub struct Edge<N> {
    pub node: N,
}

#[derive(Debug, Deserialize)]
pub struct ProductsData {
    pub products: Connection<ProductNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub metafield: Option<MetafieldValue>,
}

#[derive(Debug, Deserialize)]
pub struct MetafieldValue {
    pub value: Option<String>,
}

impl ProductNode {
    /// Convert into a product; `None` for statuses outside the rotation
    /// (e.g. archived)
    pub fn into_product(self) -> Option<Product> {
        let status = self.status.parse::<ProductStatus>().ok()?;
        let assignment_count =
            parse_assignment_count(self.metafield.as_ref().and_then(|m| m.value.as_deref()));

        Some(Product {
            id: self.id,
            title: self.title,
            status,
            tags: normalize_tags(self.tags),
            created_at: self.created_at,
            assignment_count,
        })
    }
}

impl Connection<ProductNode> {
    pub fn into_page(self) -> Page<Product> {
        let total = self.edges.len();
        let items: Vec<Product> = self
            .edges
            .into_iter()
            .filter_map(|e| e.node.into_product())
            .collect();

        if items.len() < total {
            tracing::debug!(
                skipped = total - items.len(),
                "Skipped products outside rotation statuses"
            );
        }

        Page {
            items,
            page_info: self.page_info,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionData {
    pub collection: Option<CollectionProducts>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionProducts {
    pub products: Connection<MemberNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberNode {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Connection<MemberNode> {
    pub fn into_page(self) -> Page<CollectionMember> {
        Page {
            items: self
                .edges
                .into_iter()
                .map(|e| CollectionMember {
                    id: e.node.id,
                    tags: normalize_tags(e.node.tags),
                    created_at: e.node.created_at,
                })
                .collect(),
            page_info: self.page_info,
        }
    }
}

// ============================================================================
// Mutation payloads
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdateData {
    pub product_update: Option<UserErrorsPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionUpdateData {
    pub collection_update: Option<UserErrorsPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaobjectUpdateData {
    pub metaobject_update: Option<UserErrorsPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserErrorsPayload {
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderData {
    pub collection_reorder_products: Option<ReorderPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderPayload {
    pub job: Option<JobRef>,
    #[serde(default)]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Deserialize)]
pub struct JobRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountData {
    pub products_count: Option<Count>,
}

#[derive(Debug, Deserialize)]
pub struct Count {
    pub count: u64,
}

#[derive(Debug, Deserialize)]
pub struct MetaobjectData {
    pub metaobject: Option<MetaobjectFields>,
}

#[derive(Debug, Deserialize)]
pub struct MetaobjectFields {
    #[serde(default)]
    pub fields: Vec<MetaobjectField>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MetaobjectField {
    pub key: String,
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_node_conversion() {
        let json = r#"{
            "id": "gid://shopify/Product/1",
            "title": "Lamp",
            "status": "DRAFT",
            "tags": ["new", " sale "],
            "createdAt": "2024-05-01T10:00:00Z",
            "metafield": { "value": "3" }
        }"#;
        let node: ProductNode = serde_json::from_str(json).unwrap();
        let product = node.into_product().unwrap();

        assert_eq!(product.status, ProductStatus::Draft);
        assert_eq!(product.assignment_count, Some(3));
        assert!(product.tags.contains("sale"));
    }

    #[test]
    fn test_archived_product_is_dropped() {
        let json = r#"{ "id": "1", "status": "ARCHIVED", "createdAt": null, "metafield": null }"#;
        let node: ProductNode = serde_json::from_str(json).unwrap();
        assert!(node.into_product().is_none());
    }

    #[test]
    fn test_user_error_null_field() {
        let json = r#"{ "field": null, "message": "Invalid" }"#;
        let err: UserError = serde_json::from_str(json).unwrap();
        let converted = into_field_errors(vec![err]);
        assert!(converted[0].field.is_empty());
        assert_eq!(converted[0].message, "Invalid");
    }

    #[test]
    fn test_throttled_error_entry() {
        let json = r#"{ "message": "Throttled", "extensions": { "code": "THROTTLED" } }"#;
        let entry: ErrorEntry = serde_json::from_str(json).unwrap();
        assert!(entry.is_throttled());
    }
}
