use log::{ info, error };
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::{ DeploymentClient, DeploymentRequest, LlmError, ResponseFormat, CHAT_DEPLOYMENT };
use crate::models::chat::{ ChatMessage, ConversationHistory };
use crate::models::reading::ReadingSet;
use crate::storage::StorageError;
use crate::store::{ ConversationStore, ReadingStore };

/// Returned by insight generation when there is nothing to analyse.
pub const NO_DATA_SENTINEL: &str = "No data found.";

/// Fixed opening line sent when a new chat session starts.
const GREETING: &str = "Hello!";

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("No latest HbA1c value available")]
    NoData,
    #[error("AI service error: {0}")]
    External(#[from] LlmError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Failed to serialize readings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub conversations: ConversationHistory,
}

#[derive(Clone)]
pub struct InsightService {
    client: Arc<dyn DeploymentClient>,
    readings: ReadingStore,
    conversations: ConversationStore,
    insight_deployment: String,
}

/// Readings rendered the way the deployments expect them: pretty JSON, 4-space indent.
fn blood_record(readings: &ReadingSet) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    readings.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

impl InsightService {
    pub fn new(
        client: Arc<dyn DeploymentClient>,
        readings: ReadingStore,
        conversations: ConversationStore,
        insight_deployment: impl Into<String>
    ) -> Self {
        Self {
            client,
            readings,
            conversations,
            insight_deployment: insight_deployment.into(),
        }
    }

    pub async fn generate_insights(&self) -> Result<String, InsightError> {
        let readings = self.readings.get_all().await?;
        if readings.is_empty() {
            info!("No readings stored, skipping insight generation");
            return Ok(NO_DATA_SENTINEL.to_string());
        }

        let request = DeploymentRequest::new(self.insight_deployment.as_str())
            .input("blood_record", blood_record(&readings)?)
            .response_format(ResponseFormat::json_object());

        let text = self.client.invoke(request).await.map_err(|e| {
            error!("Insight generation failed: {}", e);
            e
        })?;
        info!("Generated insights ({} chars) for {} readings", text.len(), readings.len());
        Ok(text)
    }

    /// One user turn: the message joins the history before the call so the
    /// deployment sees it as the latest prefix message.
    pub async fn chat(&self, message: &str) -> Result<ChatOutcome, InsightError> {
        let readings = self.readings.get_all().await?;
        let mut conversations = self.conversations.get_all().await?;
        conversations.push(ChatMessage::user(message));

        let request = DeploymentRequest::new(CHAT_DEPLOYMENT)
            .input("blood_record", blood_record(&readings)?)
            .input("user_message", message)
            .prefix_messages(conversations.clone());

        let reply = self.client.invoke(request).await?;
        conversations.push(ChatMessage::assistant(reply.as_str()));
        self.conversations.save(&conversations).await?;

        Ok(ChatOutcome { reply, conversations })
    }

    /// Opens a session with a fixed greeting. Only the assistant turn is recorded.
    pub async fn initial_greeting(&self) -> Result<ChatOutcome, InsightError> {
        let readings = self.readings.get_all().await?;
        if readings.is_empty() {
            return Err(InsightError::NoData);
        }
        let mut conversations = self.conversations.get_all().await?;

        let request = DeploymentRequest::new(CHAT_DEPLOYMENT)
            .input("blood_record", blood_record(&readings)?)
            .input("message", GREETING)
            .prefix_messages(conversations.clone());

        let reply = self.client.invoke(request).await?;
        conversations.push(ChatMessage::assistant(reply.as_str()));
        self.conversations.save(&conversations).await?;

        Ok(ChatOutcome { reply, conversations })
    }
}
