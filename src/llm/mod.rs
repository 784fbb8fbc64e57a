pub mod openai;
pub mod orq;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::models::chat::ChatMessage;
use self::openai::OpenAIDeploymentClient;
use self::orq::OrqDeploymentClient;

/// Deployment answering free-form chat turns.
pub const CHAT_DEPLOYMENT: &str = "healthmonitorchat";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Orq,
    OpenAI,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}

impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "orq" => Ok(LlmType::Orq),
            "openai" => Ok(LlmType::OpenAI),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self { format_type: "json_object".to_string() }
    }
}

/// One call against a named deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    pub key: String,
    pub inputs: BTreeMap<String, String>,
    pub prefix_messages: Vec<ChatMessage>,
    pub response_format: Option<ResponseFormat>,
}

impl DeploymentRequest {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            inputs: BTreeMap::new(),
            prefix_messages: Vec::new(),
            response_format: None,
        }
    }

    pub fn input(mut self, name: &str, value: impl Into<String>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn prefix_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.prefix_messages = messages;
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Deployment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Deployment returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Deployment returned no choices")]
    EmptyResponse,
    #[error("Deployment client configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait DeploymentClient: Send + Sync {
    /// Invokes the deployment and returns the first choice's message text.
    async fn invoke(&self, request: DeploymentRequest) -> Result<String, LlmError>;
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn DeploymentClient>, LlmError> {
    let client: Arc<dyn DeploymentClient> = match config.llm_type {
        LlmType::Orq => Arc::new(OrqDeploymentClient::from_config(config)?),
        LlmType::OpenAI => Arc::new(OpenAIDeploymentClient::from_config(config)?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!("ORQ".parse::<LlmType>(), Ok(LlmType::Orq));
        assert_eq!("openai".parse::<LlmType>(), Ok(LlmType::OpenAI));
        assert!("gemini".parse::<LlmType>().is_err());
    }

    #[test]
    fn request_builder_collects_inputs() {
        let request = DeploymentRequest::new(CHAT_DEPLOYMENT)
            .input("blood_record", "{}")
            .input("user_message", "hi")
            .response_format(ResponseFormat::json_object());

        assert_eq!(request.key, "healthmonitorchat");
        assert_eq!(request.inputs.len(), 2);
        assert_eq!(request.inputs["user_message"], "hi");
        assert_eq!(request.response_format.unwrap().format_type, "json_object");
    }
}
