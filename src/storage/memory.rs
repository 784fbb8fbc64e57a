use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ DocumentStore, Resource, StorageError };

/// Keeps documents in process memory; contents are lost on restart.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<Resource, JsonValue>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read(&self, resource: Resource) -> Result<JsonValue, StorageError> {
        let documents = self.documents.read().await;
        Ok(documents.get(&resource).cloned().unwrap_or_else(|| resource.empty_default()))
    }

    async fn write(&self, resource: Resource, value: &JsonValue) -> Result<(), StorageError> {
        self.documents.write().await.insert(resource, value.clone());
        Ok(())
    }
}
