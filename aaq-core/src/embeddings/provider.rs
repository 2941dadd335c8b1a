//! Embedding provider trait and vector helpers.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Trait for embedding providers that convert text to vectors.
///
/// Production uses the OpenAI-compatible HTTP provider; tests plug in a
/// deterministic stub. Implementations classify failures: a semantic
/// rejection by the endpoint surfaces [`Error::EmbeddingRejected`], transport
/// trouble surfaces [`Error::UpstreamUnavailable`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts in batch.
    ///
    /// Default implementation calls `embed_text` for each text.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text).await?);
        }
        Ok(embeddings)
    }

    /// Vector dimension this provider produces
    fn embedding_dimension(&self) -> usize;

    /// Model name/identifier; mixed into cache keys
    fn model_name(&self) -> &str;
}

/// Utility functions shared by providers
pub mod utils {
    use super::{Error, Result};

    /// Normalize a vector to unit length
    #[must_use]
    pub fn normalize_vector(mut vector: Vec<f32>) -> Vec<f32> {
        let magnitude = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }
        vector
    }

    /// Validate embedding dimension matches expected
    pub fn validate_dimension(embedding: &[f32], expected: usize) -> Result<()> {
        if embedding.len() != expected {
            return Err(Error::Validation(format!(
                "embedding dimension mismatch: got {}, expected {expected}",
                embedding.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::utils;

    #[test]
    fn test_normalize_vector() {
        let normalized = utils::normalize_vector(vec![3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 0.001);
        assert!((normalized[1] - 0.8).abs() < 0.001);

        let magnitude = normalized.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let normalized = utils::normalize_vector(vec![0.0, 0.0, 0.0]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_validate_dimension() {
        let embedding = vec![1.0, 2.0, 3.0];
        assert!(utils::validate_dimension(&embedding, 3).is_ok());
        assert!(utils::validate_dimension(&embedding, 4).is_err());
    }
}
