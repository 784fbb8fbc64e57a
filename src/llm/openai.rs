use async_trait::async_trait;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };

use super::{ DeploymentClient, DeploymentRequest, LlmConfig, LlmError, ResponseFormat };

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Serves deployments through an OpenAI-compatible chat completions API.
/// The deployment key doubles as the model name.
pub struct OpenAIDeploymentClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct OpenAIChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a ResponseFormat>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

/// Deployment inputs have no native slot in chat completions; they travel
/// as a leading system message.
fn render_inputs(request: &DeploymentRequest) -> Option<OpenAIMessage> {
    if request.inputs.is_empty() {
        return None;
    }
    let content = request.inputs
        .iter()
        .map(|(name, value)| format!("{}:\n{}", name, value))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(OpenAIMessage { role: "system".to_string(), content })
}

impl OpenAIDeploymentClient {
    pub fn new(api_key: &str, base_url: Option<String>) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::Config(format!("Invalid API key format: {}", e)))?
        );

        let http = HttpClient::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::Config("OpenAI API key is required".to_string()));
        }
        Self::new(&config.api_key, config.base_url.clone())
    }
}

#[async_trait]
impl DeploymentClient for OpenAIDeploymentClient {
    async fn invoke(&self, request: DeploymentRequest) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        let mut messages: Vec<OpenAIMessage> = render_inputs(&request).into_iter().collect();
        messages.extend(
            request.prefix_messages.iter().map(|m| OpenAIMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
        );

        let req = OpenAIChatRequest {
            model: &request.key,
            messages,
            response_format: request.response_format.as_ref(),
        };

        let resp = self.http.post(&url).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let resp = resp.json::<OpenAIResponse>().await?;
        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}
