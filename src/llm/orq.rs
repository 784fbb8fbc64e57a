use async_trait::async_trait;
use log::debug;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::collections::BTreeMap;

use super::{ DeploymentClient, DeploymentRequest, LlmConfig, LlmError, ResponseFormat };
use crate::models::chat::ChatMessage;

const DEFAULT_BASE_URL: &str = "https://my.orq.ai";

pub struct OrqDeploymentClient {
    http: HttpClient,
    base_url: String,
}

#[derive(Serialize)]
struct InvokeRequest<'a> {
    key: &'a str,
    inputs: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "no_messages")]
    prefix_messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    extra_params: Option<ExtraParams<'a>>,
}

fn no_messages(messages: &&[ChatMessage]) -> bool {
    messages.is_empty()
}

#[derive(Serialize)]
struct ExtraParams<'a> {
    response_format: &'a ResponseFormat,
}

#[derive(Deserialize)]
struct InvokeResponse {
    choices: Vec<InvokeChoice>,
}

#[derive(Deserialize)]
struct InvokeChoice {
    message: InvokeMessage,
}

#[derive(Deserialize)]
struct InvokeMessage {
    content: String,
}

impl OrqDeploymentClient {
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
            return Err(LlmError::Config("Orq API key is required".to_string()));
        }
        Self::new(&config.api_key, config.base_url.clone())
    }
}

#[async_trait]
impl DeploymentClient for OrqDeploymentClient {
    async fn invoke(&self, request: DeploymentRequest) -> Result<String, LlmError> {
        let url = format!("{}/v2/deployments/invoke", self.base_url.trim_end_matches('/'));
        let body = InvokeRequest {
            key: &request.key,
            inputs: &request.inputs,
            prefix_messages: &request.prefix_messages,
            extra_params: request.response_format
                .as_ref()
                .map(|response_format| ExtraParams { response_format }),
        };
        debug!(
            "Invoking deployment '{}' with {} prefix messages",
            request.key,
            request.prefix_messages.len()
        );

        let resp = self.http.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let parsed = resp.json::<InvokeResponse>().await?;
        parsed.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn invoke_sends_deployment_payload() {
        let server = MockServer::start_async().await;
        let invoke = server.mock_async(|when, then| {
            when.method(POST)
                .path("/v2/deployments/invoke")
                .header("authorization", "Bearer orq-key")
                .json_body(
                    json!({
                        "key": "healthmonitorchat",
                        "inputs": {"blood_record": "{}", "user_message": "hi"},
                        "prefix_messages": [{"role": "user", "content": "hi"}]
                    })
                );
            then.status(200).json_body(
                json!({
                    "id": "01J",
                    "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}}]
                })
            );
        }).await;

        let client = OrqDeploymentClient::new("orq-key", Some(server.base_url())).unwrap();
        let request = DeploymentRequest::new("healthmonitorchat")
            .input("blood_record", "{}")
            .input("user_message", "hi")
            .prefix_messages(vec![ChatMessage::user("hi")]);

        assert_eq!(client.invoke(request).await.unwrap(), "hello");
        invoke.assert_async().await;
    }

    #[tokio::test]
    async fn response_format_goes_into_extra_params() {
        let server = MockServer::start_async().await;
        let invoke = server.mock_async(|when, then| {
            when.method(POST)
                .path("/v2/deployments/invoke")
                .json_body_partial(r#"{"extra_params": {"response_format": {"type": "json_object"}}}"#);
            then.status(200).json_body(json!({"choices": [{"message": {"content": "{}"}}]}));
        }).await;

        let client = OrqDeploymentClient::new("orq-key", Some(server.base_url())).unwrap();
        let request = DeploymentRequest::new("insights")
            .input("blood_record", "{}")
            .response_format(ResponseFormat::json_object());

        assert_eq!(client.invoke(request).await.unwrap(), "{}");
        invoke.assert_async().await;
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/v2/deployments/invoke");
            then.status(401).body("unauthorized");
        }).await;

        let client = OrqDeploymentClient::new("bad", Some(server.base_url())).unwrap();
        let err = client.invoke(DeploymentRequest::new("insights")).await.unwrap_err();
        assert!(matches!(err, LlmError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn no_choices_is_empty_response() {
        let server = MockServer::start_async().await;
        server.mock_async(|when, then| {
            when.method(POST).path("/v2/deployments/invoke");
            then.status(200).json_body(json!({"choices": []}));
        }).await;

        let client = OrqDeploymentClient::new("orq-key", Some(server.base_url())).unwrap();
        let err = client.invoke(DeploymentRequest::new("insights")).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
    }
}
