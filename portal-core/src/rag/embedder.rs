//! Embedding generation using LLM providers.

use crate::provider::{Provider, ProviderError};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during embedding generation.
#[derive(Debug, Error)]
pub enum EmbedderError {
    /// The provider API returned an error (including a missing API key).
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The API response contained an empty vector.
    #[error("No embeddings returned")]
    NoEmbeddings,
}

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedderError>;

/// Converts text into vectors with the configured embedding model.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Embedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generates a vector embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No API key is configured
    /// - The embedding endpoint is unreachable or rejects the request
    /// - The response carries no values
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let values = self.provider.embed(text, &self.model).await?;
        if values.is_empty() {
            return Err(EmbedderError::NoEmbeddings);
        }
        Ok(values)
    }
}
