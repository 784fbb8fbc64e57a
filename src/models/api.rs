use serde::{ Deserialize, Serialize };

use super::chat::ConversationHistory;

#[derive(Serialize, Deserialize, Debug)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: &str) -> Self {
        Self { status: "success".into(), message: message.into() }
    }

    pub fn error(message: String) -> Self {
        Self { status: "error".into(), message }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct InsightsResponse {
    pub response_text: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryResponse {
    pub conversations: ConversationHistory,
}

#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChatResponse {
    pub message: String,
    pub conversations: ConversationHistory,
}
