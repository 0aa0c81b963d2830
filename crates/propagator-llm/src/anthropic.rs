//! Anthropic Messages API provider.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::{Completion, CompletionRequest, ModelProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic client configuration.
#[derive(Clone)]
pub struct AnthropicConfig {
    /// API base URL, overridable for tests and proxies.
    pub base_url: String,
    /// API key sent as `x-api-key`.
    pub api_key: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Model provider backed by the Anthropic Messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    config: AnthropicConfig,
    http_client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(config: AnthropicConfig) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("spec-propagator/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(AnthropicProvider {
            config,
            http_client,
        })
    }

    /// Build the JSON request body for the Messages API.
    pub fn build_request_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "user", "content": request.prompt }
            ],
        });

        if let Some(system) = &request.system {
            body["system"] = serde_json::Value::String(system.clone());
        }

        body
    }

    /// Decode a successful Messages API body into a [`Completion`].
    pub fn parse_response_body(body: &str) -> ProviderResult<Completion> {
        let api_resp: MessagesResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        if api_resp.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderError::ContentRejected(
                "model stopped with a refusal".to_string(),
            ));
        }

        let text = api_resp
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            model: api_resp.model,
            input_tokens: api_resp.usage.input_tokens,
            output_tokens: api_resp.usage.output_tokens,
            stop_reason: api_resp.stop_reason,
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<Completion> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));
        debug!(model = %request.model, prompt_chars = request.prompt.len(), "Sending completion request");

        let resp = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&Self::build_request_body(request))
            .send()
            .await?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = resp.text().await?;

        if !(200..300).contains(&status) {
            return Err(ProviderError::from_status(status, &body, retry_after));
        }

        let completion = Self::parse_response_body(&body)?;
        debug!(
            input_tokens = completion.input_tokens,
            output_tokens = completion.output_tokens,
            "Completion received"
        );
        Ok(completion)
    }
}
