//! OpenAI-compatible chat-completions client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatModel, ChatRequest};
use crate::config::LlmSettings;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [super::ChatMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// Chat model backed by any `/v1/chat/completions` endpoint
pub struct HttpChatModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl HttpChatModel {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let url = self.completions_url();
        let body = CompletionRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = self.retry_delay_ms * 2u64.pow(attempt - 1);
                tracing::debug!(attempt, delay_ms, "retrying LLM request");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let mut builder = self.client.post(&url).json(&body);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "LLM request transport failure");
                    last_error = Some(Error::UpstreamUnavailable(e.to_string()));
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let parsed: CompletionResponse = response.json().await.map_err(|e| {
                    Error::UpstreamUnavailable(format!("malformed completion response: {e}"))
                })?;
                return parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
                    .ok_or_else(|| {
                        Error::UpstreamUnavailable("endpoint returned no choices".to_string())
                    });
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            let text = response.text().await.unwrap_or_default();
            if retryable {
                tracing::warn!(%status, "retryable LLM endpoint error");
                last_error = Some(Error::UpstreamUnavailable(format!(
                    "LLM endpoint error {status}: {text}"
                )));
                continue;
            }

            return Err(Error::GenerationFailed(format!(
                "LLM endpoint rejected request ({status}): {text}"
            )));
        }

        Err(last_error
            .unwrap_or_else(|| Error::UpstreamUnavailable("all retry attempts failed".to_string())))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
