use super::{ContentBlock, LLMError, LLMProvider, ModelRequest, ModelResponse, StopReason, Usage};
use crate::secrets::SecretString;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client with native tool use
pub struct AnthropicProvider {
    base_url: String,
    api_key: SecretString,
    timeout_secs: u64,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
    #[serde(default)]
    usage: Usage,
}

impl AnthropicProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout_secs: u64,
    ) -> super::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LLMError::NetworkError(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout_secs,
            client,
        })
    }

    fn payload(request: &ModelRequest) -> serde_json::Value {
        let mut payload = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "system": request.system,
            "messages": request.messages,
        });

        if !request.tools.is_empty() {
            let tools: Vec<serde_json::Value> = request
                .tools
                .iter()
                .map(|spec| {
                    json!({
                        "name": spec.name,
                        "description": spec.description,
                        "input_schema": spec.input_schema,
                    })
                })
                .collect();
            payload["tools"] = json!(tools);
        }

        payload
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: &ModelRequest) -> super::Result<ModelResponse> {
        let url = format!("{}/messages", self.base_url);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Calling Anthropic"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&Self::payload(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LLMError::Timeout(self.timeout_secs)
                } else {
                    LLMError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                429 => LLMError::RateLimitExceeded,
                _ => LLMError::InvalidRequest(format!("{}: {}", status, text)),
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        let content: Vec<ContentBlock> = body
            .content
            .into_iter()
            .filter(|block| !matches!(block, ContentBlock::Other))
            .collect();

        Ok(ModelResponse {
            content,
            stop_reason: body.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: body.usage,
        })
    }
}
