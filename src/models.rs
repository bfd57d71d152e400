//! Core data structures and types
//!
//! Strongly-typed shapes for everything that crosses the catalog boundary.
//! Raw API payloads are decoded into these once, in [`crate::catalog::client`],
//! so the rotation logic never touches loosely-shaped JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Product Status
// ============================================================================

/// Publication status of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProductStatus {
    /// Publicly visible
    Active,
    /// Hidden, part of the draft pool
    Draft,
}

impl ProductStatus {
    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Draft => "DRAFT",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "DRAFT" => Ok(Self::Draft),
            other => Err(format!("unknown product status '{other}'")),
        }
    }
}

/// Which products an operation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusFilter {
    /// Every product regardless of status
    #[default]
    All,
    Active,
    Draft,
}

impl StatusFilter {
    /// Check whether a status passes the filter
    pub fn matches(&self, status: ProductStatus) -> bool {
        match self {
            Self::All => true,
            Self::Active => status == ProductStatus::Active,
            Self::Draft => status == ProductStatus::Draft,
        }
    }

    /// The single status this filter selects, if any
    pub fn status(&self) -> Option<ProductStatus> {
        match self {
            Self::All => None,
            Self::Active => Some(ProductStatus::Active),
            Self::Draft => Some(ProductStatus::Draft),
        }
    }
}

impl From<ProductStatus> for StatusFilter {
    fn from(status: ProductStatus) -> Self {
        match status {
            ProductStatus::Active => Self::Active,
            ProductStatus::Draft => Self::Draft,
        }
    }
}

impl FromStr for StatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        ProductStatus::from_str(s).map(Self::from)
    }
}

// ============================================================================
// Category Tags
// ============================================================================

/// Primary category tag driving selection quotas and collection order
///
/// Declaration order is the collection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CategoryTag {
    New,
    SlightlyUsed,
    Used,
}

impl CategoryTag {
    /// All categories in priority order
    pub fn all() -> [Self; 3] {
        [Self::New, Self::SlightlyUsed, Self::Used]
    }

    /// Tag text as stored on products
    pub fn tag(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::SlightlyUsed => "slightly-used",
            Self::Used => "used",
        }
    }

    /// Rank within the collection ordering (untagged products rank after all)
    pub fn rank(&self) -> usize {
        match self {
            Self::New => 0,
            Self::SlightlyUsed => 1,
            Self::Used => 2,
        }
    }

    /// Match a single tag (case-insensitive, surrounding whitespace ignored)
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        Self::all()
            .into_iter()
            .find(|category| category.tag().eq_ignore_ascii_case(tag))
    }

    /// Primary category of a tag set; the highest-priority match wins
    pub fn primary<'a, I>(tags: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tags.into_iter().filter_map(|t| Self::from_tag(t)).min()
    }
}

impl fmt::Display for CategoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Normalize raw tags into a deduplicated set, dropping blanks
pub fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

// ============================================================================
// Product
// ============================================================================

/// A catalog product as seen by the rotation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Opaque catalog key (`gid://shopify/Product/...`)
    pub id: String,
    pub title: String,
    pub status: ProductStatus,
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,

    /// How many times this product has been rotated in; `None` when the
    /// metafield is absent or not an integer
    pub assignment_count: Option<i64>,
}

impl Product {
    /// Create a product with no tags
    pub fn new(id: impl Into<String>, status: ProductStatus) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            status,
            tags: BTreeSet::new(),
            created_at: None,
            assignment_count: None,
        }
    }

    /// Builder-style tag setter
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_assignment_count(mut self, count: i64) -> Self {
        self.assignment_count = Some(count);
        self
    }

    /// Primary category tag, if any
    pub fn category(&self) -> Option<CategoryTag> {
        CategoryTag::primary(&self.tags)
    }

    /// Case-insensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim();
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Value the assignment counter takes when this product is activated
    pub fn next_assignment_count(&self) -> i64 {
        match self.assignment_count {
            None | Some(0) => 1,
            Some(n) => n + 1,
        }
    }
}

/// Parse a raw metafield value into an assignment count
pub fn parse_assignment_count(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
}

// ============================================================================
// Queries and Pagination
// ============================================================================

/// Filter for product listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub status: StatusFilter,
    /// Products must carry every one of these tags
    pub with_tags: Vec<String>,
    /// Products must carry none of these tags
    pub without_tags: Vec<String>,
}

impl ProductQuery {
    /// Every product in the catalog
    pub fn all() -> Self {
        Self::default()
    }

    /// Products with the given status
    pub fn with_status(status: ProductStatus) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.with_tags.push(tag.into());
        self
    }

    pub fn not_tagged(mut self, tag: impl Into<String>) -> Self {
        self.without_tags.push(tag.into());
        self
    }

    /// Check a product against the filter
    pub fn matches(&self, product: &Product) -> bool {
        self.status.matches(product.status)
            && self.with_tags.iter().all(|t| product.has_tag(t))
            && !self.without_tags.iter().any(|t| product.has_tag(t))
    }

    /// Render as a catalog search string (`status:DRAFT tag:new -tag:x`)
    pub fn search_string(&self) -> Option<String> {
        let mut terms = Vec::new();
        if let Some(status) = self.status.status() {
            terms.push(format!("status:{status}"));
        }
        for tag in &self.with_tags {
            terms.push(format!("tag:'{tag}'"));
        }
        for tag in &self.without_tags {
            terms.push(format!("-tag:'{tag}'"));
        }

        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" "))
        }
    }
}

/// Cursor state returned with every page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a cursor-paged listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// A final page with no successor
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            page_info: PageInfo::default(),
        }
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Field-level error reported inside an otherwise successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub field: Vec<String>,
    pub message: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: Vec::new(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.field.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.field.join("."), self.message)
        }
    }
}

/// Outcome of a mutation whose transport succeeded
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult<T> {
    /// Collaborator applied the write
    Applied(T),
    /// Collaborator reported field errors
    Rejected(Vec<FieldError>),
}

impl<T> MutationResult<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    /// Classify a payload by its field-error list
    pub fn from_errors(value: T, errors: Vec<FieldError>) -> Self {
        if errors.is_empty() {
            Self::Applied(value)
        } else {
            Self::Rejected(errors)
        }
    }
}

/// Product metafield write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetafieldInput {
    pub namespace: String,
    pub key: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl MetafieldInput {
    /// Integer metafield
    pub fn integer(namespace: impl Into<String>, key: impl Into<String>, value: i64) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            kind: "number_integer".to_string(),
            value: value.to_string(),
        }
    }
}

/// A single product write carrying only the fields being changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductUpdate {
    pub id: String,
    pub status: Option<ProductStatus>,
    /// Full replacement tag set
    pub tags: Option<BTreeSet<String>>,
    pub metafields: Vec<MetafieldInput>,
}

impl ProductUpdate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: None,
            tags: None,
            metafields: Vec::new(),
        }
    }

    pub fn status(mut self, status: ProductStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn tags(mut self, tags: BTreeSet<String>) -> Self {
        self.tags = Some(tags);
        self
    }

    pub fn metafield(mut self, metafield: MetafieldInput) -> Self {
        self.metafields.push(metafield);
        self
    }
}

// ============================================================================
// Collections
// ============================================================================

/// A collection member with the fields ranking needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMember {
    pub id: String,
    pub tags: BTreeSet<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl CollectionMember {
    pub fn category(&self) -> Option<CategoryTag> {
        CategoryTag::primary(&self.tags)
    }
}

impl From<&Product> for CollectionMember {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.clone(),
            tags: product.tags.clone(),
            created_at: product.created_at,
        }
    }
}

/// Move a member to an absolute, 1-based position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionMove {
    pub id: String,
    pub position: usize,
}

/// Collection sort mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortMode {
    Manual,
    BestSelling,
    Created,
    CreatedDesc,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::BestSelling => "BEST_SELLING",
            Self::Created => "CREATED",
            Self::CreatedDesc => "CREATED_DESC",
        }
    }
}
