//! Deterministic stub providers for embeddings and chat completions.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use aaq_core::embeddings::provider::utils::normalize_vector;
use aaq_core::llm::{ChatModel, ChatRequest};
use aaq_core::{EmbeddingProvider, Error, Result};

/// Words carrying no topical signal, dropped before hashing
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "during", "for", "have", "how", "i", "in", "is", "it",
    "my", "of", "on", "or", "the", "to", "what", "when", "i'm",
];

/// Deterministic embedding stub based on token overlap.
///
/// Each non-stopword token hashes to one dimension; texts sharing tokens get
/// genuinely similar vectors, so retrieval and urgency tests exercise real
/// ranking behaviour instead of hash noise.
pub struct StubEmbeddingProvider {
    dimension: usize,
}

impl StubEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Token-bag embedding: hash each token to a dimension and normalize
    #[must_use]
    pub fn embedding_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let index = (hasher.finish() as usize) % self.dimension;
            vector[index] += 1.0;
        }
        normalize_vector(vector)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(str::trim)
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(ToString::to_string)
        .collect()
}

#[async_trait]
impl EmbeddingProvider for StubEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embedding_for(text))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "stub-token-overlap"
    }
}

/// Embedding stub that always fails, for degraded-path tests
pub struct FailingEmbeddingProvider {
    pub dimension: usize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbeddingProvider {
    async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::UpstreamUnavailable("stub embedding outage".to_string()))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "stub-failing"
    }
}

/// Scripted chat model.
///
/// Recognizes the service's classifier prompts by their system-message
/// markers and answers them consistently; everything else is treated as a
/// generation call and answered with `answer_text`. Every request is
/// recorded for assertions.
pub struct StubChatModel {
    /// Answer returned for generation calls
    pub answer_text: String,
    /// Queries (by substring) the safety classifier should flag
    pub flag_unsafe_containing: Vec<String>,
    /// Language code reported for every query
    pub language: String,
    /// Score returned by the alignment judge
    pub align_score: f32,
    /// Urgency verdict for LLM-based detection
    pub is_urgent: bool,
    pub calls: Mutex<Vec<ChatRequest>>,
}

impl Default for StubChatModel {
    fn default() -> Self {
        Self {
            answer_text: "Based on [1], this is covered by the first snippet.".to_string(),
            flag_unsafe_containing: Vec::new(),
            language: "en".to_string(),
            align_score: 1.0,
            is_urgent: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl StubChatModel {
    /// All requests seen so far
    #[must_use]
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    /// Number of generation (non-classifier) calls
    #[must_use]
    pub fn generation_calls(&self) -> usize {
        self.calls.lock().iter().filter(|c| !c.json_mode).count()
    }

    fn system_text(request: &ChatRequest) -> String {
        request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn user_text(request: &ChatRequest) -> String {
        request
            .messages
            .iter()
            .filter(|m| m.role == "user")
            .map(|m| m.content.clone())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.calls.lock().push(request.clone());

        let system = Self::system_text(request);
        let user = Self::user_text(request);

        if system.contains("Identify the language") {
            return Ok(format!(r#"{{"language": "{}"}}"#, self.language));
        }
        if system.contains("content safety classifier") {
            let flagged = self
                .flag_unsafe_containing
                .iter()
                .any(|marker| user.contains(marker.as_str()));
            return Ok(format!(
                r#"{{"safe": {}, "category": {}, "redacted_text": null}}"#,
                !flagged,
                if flagged { "\"harm\"" } else { "null" }
            ));
        }
        if system.contains("grounded in the provided reference") {
            return Ok(format!(r#"{{"score": {}}}"#, self.align_score));
        }
        if system.contains("medically urgent") {
            return Ok(format!(
                r#"{{"is_urgent": {}, "rationale": "stubbed"}}"#,
                self.is_urgent
            ));
        }
        if system.contains("common topic") {
            return Ok(r#"{"label": "stub topic"}"#.to_string());
        }

        Ok(self.answer_text.clone())
    }

    fn model_name(&self) -> &str {
        "stub-chat"
    }
}

/// Chat model that always fails, for degraded-path tests
pub struct FailingChatModel;

#[async_trait]
impl ChatModel for FailingChatModel {
    async fn complete(&self, _request: &ChatRequest) -> Result<String> {
        Err(Error::UpstreamUnavailable("stub LLM outage".to_string()))
    }

    fn model_name(&self) -> &str {
        "stub-failing-chat"
    }
}
