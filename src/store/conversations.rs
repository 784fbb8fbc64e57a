use std::sync::Arc;

use crate::models::chat::{ ChatMessage, ConversationHistory };
use crate::storage::{ DocumentStore, Resource, StorageError };

/// Append-only chat history persisted as a single document.
#[derive(Clone)]
pub struct ConversationStore {
    documents: Arc<dyn DocumentStore>,
}

impl ConversationStore {
    pub fn new(documents: Arc<dyn DocumentStore>) -> Self {
        Self { documents }
    }

    pub async fn get_all(&self) -> Result<ConversationHistory, StorageError> {
        let value = self.documents.read(Resource::Conversations).await?;
        serde_json::from_value(value).map_err(|source| StorageError::Shape {
            resource: Resource::Conversations,
            source,
        })
    }

    pub async fn append(&self, message: ChatMessage) -> Result<(), StorageError> {
        let mut history = self.get_all().await?;
        history.push(message);
        self.save(&history).await
    }

    /// Replaces the stored history with `history`.
    pub async fn save(&self, history: &[ChatMessage]) -> Result<(), StorageError> {
        let value = serde_json::to_value(history).map_err(|source| StorageError::Shape {
            resource: Resource::Conversations,
            source,
        })?;
        self.documents.write(Resource::Conversations, &value).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.save(&[]).await
    }
}
