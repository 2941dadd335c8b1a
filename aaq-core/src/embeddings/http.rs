//! OpenAI-compatible HTTP embedding provider.
//!
//! Talks to any `/v1/embeddings` endpoint (OpenAI, LiteLLM proxy, self-hosted
//! inference servers). Retries transport errors, 429s and 5xx responses with
//! exponential backoff; other 4xx responses fail fast as
//! [`Error::EmbeddingRejected`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::provider::EmbeddingProvider;
use crate::config::EmbeddingSettings;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP embedding provider
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl HttpEmbeddingProvider {
    pub fn new(settings: &EmbeddingSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.endpoint)
    }

    async fn request_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.embeddings_url();
        let request = EmbeddingRequest {
            input: text,
            model: &self.model,
            encoding_format: "float",
        };

        let mut last_error: Option<Error> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay_ms = self.retry_delay_ms * 2u64.pow(attempt - 1);
                tracing::debug!(attempt, delay_ms, "retrying embedding request");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let mut builder = self.client.post(&url).json(&request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key);
            }

            let response = match builder.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    tracing::warn!(error = %e, "embedding request transport failure");
                    last_error = Some(Error::UpstreamUnavailable(e.to_string()));
                    continue;
                }
            };

            let status = response.status();

            if status.is_success() {
                let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
                    Error::UpstreamUnavailable(format!("malformed embedding response: {e}"))
                })?;
                let mut data = parsed.data;
                data.sort_by_key(|item| item.index);
                return data
                    .into_iter()
                    .next()
                    .map(|item| item.embedding)
                    .ok_or_else(|| {
                        Error::UpstreamUnavailable("endpoint returned no embeddings".to_string())
                    });
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            let body = response.text().await.unwrap_or_default();
            if retryable {
                tracing::warn!(%status, "retryable embedding endpoint error");
                last_error = Some(Error::UpstreamUnavailable(format!(
                    "embedding endpoint error {status}: {body}"
                )));
                continue;
            }

            return Err(Error::EmbeddingRejected(format!(
                "embedding endpoint rejected request ({status}): {body}"
            )));
        }

        Err(last_error
            .unwrap_or_else(|| Error::UpstreamUnavailable("all retry attempts failed".to_string())))
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let started = std::time::Instant::now();
        let embedding = self.request_embedding(text).await?;
        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            dimensions = embedding.len(),
            "generated embedding"
        );
        Ok(embedding)
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
