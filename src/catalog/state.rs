//! Next-run marker storage

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::client::AdminClient;
use super::graphql;
use super::StateStore;
use crate::utils::error::{CatalogError, StateError};

/// Keeps the marker in one field of a metaobject
///
/// The marker id passed to the trait methods is the metaobject id.
pub struct MetaobjectStateStore {
    client: Arc<AdminClient>,
    field: String,
}

impl MetaobjectStateStore {
    pub fn new(client: Arc<AdminClient>, field: impl Into<String>) -> Self {
        Self {
            client,
            field: field.into(),
        }
    }
}

#[async_trait]
impl StateStore for MetaobjectStateStore {
    async fn set_next_run(&self, marker: &str, value: &str) -> Result<(), StateError> {
        let variables = json!({
            "id": marker,
            "metaobject": { "fields": [{ "key": self.field, "value": value }] },
        });

        let data: graphql::MetaobjectUpdateData = self
            .client
            .execute(graphql::UPDATE_METAOBJECT, variables)
            .await?;
        let payload = data.metaobject_update.ok_or_else(|| {
            CatalogError::Decode("response missing 'metaobjectUpdate'".to_string())
        })?;

        if !payload.user_errors.is_empty() {
            let messages: Vec<String> = payload.user_errors.into_iter().map(|e| e.message).collect();
            error!(marker, errors = ?messages, "Next-run marker rejected");
            return Err(StateError::Rejected(messages));
        }

        info!(marker, value, "Next-run marker updated");
        Ok(())
    }

    async fn next_run(&self, marker: &str) -> Result<Option<String>, StateError> {
        let data: graphql::MetaobjectData = self
            .client
            .execute(graphql::READ_METAOBJECT, json!({ "id": marker }))
            .await?;

        Ok(data.metaobject.and_then(|m| {
            m.fields
                .into_iter()
                .find(|f| f.key == self.field)
                .and_then(|f| f.value)
        }))
    }
}

/// In-process marker store
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: RwLock<HashMap<String, String>>,
    writes: RwLock<u64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far
    pub async fn write_count(&self) -> u64 {
        *self.writes.read().await
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn set_next_run(&self, marker: &str, value: &str) -> Result<(), StateError> {
        self.values
            .write()
            .await
            .insert(marker.to_string(), value.to_string());
        *self.writes.write().await += 1;
        Ok(())
    }

    async fn next_run(&self, marker: &str) -> Result<Option<String>, StateError> {
        Ok(self.values.read().await.get(marker).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_overwrites() {
        let store = MemoryStateStore::new();
        assert_eq!(store.next_run("m").await.unwrap(), None);

        store.set_next_run("m", "2024-01-01T00:00:00Z").await.unwrap();
        store.set_next_run("m", "2024-01-01T00:02:00Z").await.unwrap();

        assert_eq!(
            store.next_run("m").await.unwrap().as_deref(),
            Some("2024-01-01T00:02:00Z")
        );
        assert_eq!(store.write_count().await, 2);
    }
}
