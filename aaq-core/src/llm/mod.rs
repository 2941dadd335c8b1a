//! LLM access shared by guardrails, answer generation, urgency detection and
//! topic labelling.
//!
//! [`LlmService`] wraps any [`ChatModel`] with a global semaphore and a
//! circuit breaker, and adds a strict-JSON completion helper for classifier
//! calls.

pub mod client;

pub use client::HttpChatModel;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::embeddings::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::{Error, Result};

/// One message in a chat-completion request
#[derive(Debug, Clone, serde::Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// A chat-completion request
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint for a JSON object response
    pub json_mode: bool,
}

/// Trait over chat-completion backends; tests plug in a scripted stub
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the assistant text
    async fn complete(&self, request: &ChatRequest) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// Bounded, breaker-guarded LLM front end
pub struct LlmService {
    model: Arc<dyn ChatModel>,
    semaphore: Semaphore,
    breaker: CircuitBreaker,
    temperature: f32,
    max_tokens: u32,
}

impl LlmService {
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        max_concurrency: usize,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model,
            semaphore: Semaphore::new(max_concurrency.max(1)),
            breaker: CircuitBreaker::new(CircuitBreakerConfig::default()),
            temperature,
            max_tokens,
        }
    }

    /// Run a completion with the service-wide temperature and token bound
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.run(ChatRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: false,
        })
        .await
    }

    /// Run a completion and parse the response as strict JSON into `T`.
    ///
    /// Retries once on malformed output; the second failure surfaces the
    /// parse error so callers can apply their conservative fallback.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<T> {
        let request = ChatRequest {
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            json_mode: true,
        };

        let mut last_err = None;
        for attempt in 0..2 {
            let raw = self.run(request.clone()).await?;
            match parse_json_response(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "LLM returned malformed JSON");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| Error::Internal("json completion retry bookkeeping".to_string())))
    }

    async fn run(&self, request: ChatRequest) -> Result<String> {
        self.breaker.allow_request()?;

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Internal("LLM semaphore closed".to_string()))?;

        match self.model.complete(&request).await {
            Ok(text) => {
                self.breaker.record_success();
                Ok(text)
            }
            Err(e) => {
                if e.is_recoverable() {
                    self.breaker.record_failure();
                }
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }
}

/// Parse an LLM response as JSON, tolerating surrounding prose or markdown
/// fences but nothing looser.
pub fn parse_json_response<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str(&trimmed[start..=end]).map_err(Error::from)
        }
        _ => Err(Error::Validation(format!(
            "response contains no JSON object: {}",
            trimmed.chars().take(120).collect::<String>()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(serde::Deserialize, Debug, PartialEq)]
    struct Verdict {
        is_urgent: bool,
    }

    #[test]
    fn parses_bare_json() {
        let verdict: Verdict = parse_json_response(r#"{"is_urgent": true}"#).unwrap();
        assert!(verdict.is_urgent);
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Here you go:\n```json\n{\"is_urgent\": false}\n```";
        let verdict: Verdict = parse_json_response(raw).unwrap();
        assert!(!verdict.is_urgent);
    }

    #[test]
    fn rejects_non_json() {
        assert!(parse_json_response::<Verdict>("definitely urgent!").is_err());
    }

    struct FlakyJsonModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for FlakyJsonModel {
        async fn complete(&self, _request: &ChatRequest) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok("not json at all".to_string())
            } else {
                Ok(r#"{"is_urgent": true}"#.to_string())
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn json_completion_retries_once_on_malformed_output() {
        let model = Arc::new(FlakyJsonModel {
            calls: AtomicUsize::new(0),
        });
        let service = LlmService::new(model.clone(), 2, 0.1, 256);
        let verdict: Verdict = service
            .complete_json(vec![ChatMessage::user("urgent?")])
            .await
            .unwrap();
        assert!(verdict.is_urgent);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }
}
