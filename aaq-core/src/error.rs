use uuid::Uuid;

/// Result type alias for AAQ core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the question-answering service
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Authentication required: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query trace not found: {0}")]
    TraceNotFound(Uuid),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Daily API quota exceeded for workspace {workspace_id}")]
    QuotaExceeded { workspace_id: i64 },

    #[error("Content quota reached for workspace {workspace_id} ({quota} items)")]
    ContentQuotaExceeded { workspace_id: i64, quota: i64 },

    #[error("Upstream service unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Embedding request rejected: {0}")]
    EmbeddingRejected(String),

    #[error("Answer generation failed: {0}")]
    GenerationFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Circuit breaker open")]
    CircuitBreakerOpen,

    #[error("Storage error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is recoverable (can retry with backoff)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::UpstreamUnavailable(_) => true,
            Error::Timeout(_) => true,
            Error::CircuitBreakerOpen => true,
            Error::Database(_) => true,
            Error::Cache(_) => true,
            Error::Unauthenticated(_)
            | Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::TraceNotFound(_)
            | Error::AlreadyExists(_)
            | Error::Validation(_)
            | Error::QuotaExceeded { .. }
            | Error::ContentQuotaExceeded { .. }
            | Error::EmbeddingRejected(_)
            | Error::GenerationFailed(_)
            | Error::Serialization(_)
            | Error::Internal(_) => false,
        }
    }

    /// Machine-readable error code used in HTTP bodies
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthenticated(_) => "unauthenticated",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) | Error::TraceNotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::Validation(_) => "validation_error",
            Error::QuotaExceeded { .. } => "quota_exceeded",
            Error::ContentQuotaExceeded { .. } => "content_quota_exceeded",
            Error::UpstreamUnavailable(_) => "upstream_unavailable",
            Error::EmbeddingRejected(_) => "embedding_rejected",
            Error::GenerationFailed(_) => "generation_failed",
            Error::Timeout(_) => "timeout",
            Error::CircuitBreakerOpen => "upstream_unavailable",
            Error::Database(_) => "storage_error",
            Error::Cache(_) => "cache_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_classification() {
        assert!(Error::UpstreamUnavailable("llm down".into()).is_recoverable());
        assert!(Error::Timeout("embed".into()).is_recoverable());
        assert!(!Error::Forbidden("role".into()).is_recoverable());
        assert!(!Error::QuotaExceeded { workspace_id: 1 }.is_recoverable());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(Error::Validation("title".into()).code(), "validation_error");
        assert_eq!(Error::QuotaExceeded { workspace_id: 7 }.code(), "quota_exceeded");
        assert_eq!(Error::TraceNotFound(Uuid::nil()).code(), "not_found");
    }
}
