//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and a local implementation using
//! all-MiniLM-L6-v2 (384 dimensions, L2-normalized). The provider is created
//! via [`create_provider`] from configuration. Embedding is the one external
//! collaborator the semantic index depends on; callers that cannot tolerate
//! transient failures wrap batches in [`embed_batch_with_retry`].

pub mod local;

use anyhow::Result;
use std::time::Duration;

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`EMBEDDING_DIM`]
/// dimensions. All methods are synchronous — callers in async contexts should
/// use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Embed one batch with bounded retry: `attempts` tries, exponential backoff
/// starting at 500ms. Returns the last error once attempts are exhausted.
pub fn embed_batch_with_retry(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    attempts: u32,
) -> Result<Vec<Vec<f32>>> {
    let mut backoff = Duration::from_millis(500);
    let mut last_err = None;
    for attempt in 1..=attempts.max(1) {
        match provider.embed_batch(texts) {
            Ok(vectors) => return Ok(vectors),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "embedding batch failed");
                last_err = Some(err);
                if attempt < attempts {
                    std::thread::sleep(backoff);
                    backoff *= 2;
                }
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("embedding failed with no attempts")))
}

/// Create an embedding provider from config.
///
/// Currently only `"local"` is supported (ONNX Runtime + all-MiniLM-L6-v2).
/// Returns an error if model files are not found — run `testimony model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}
