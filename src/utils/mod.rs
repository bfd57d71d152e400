//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod error;
pub mod retry;

use std::time::Duration;

const PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";

/// Normalize a product id into its global id form
///
/// Bare numeric ids are prefixed; anything already in `gid://` form is kept.
pub fn to_product_gid(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("gid://") {
        id.to_string()
    } else {
        format!("{PRODUCT_GID_PREFIX}{id}")
    }
}

/// Sleep for `delay` unless it is zero
pub async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Truncate text to a maximum length
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
