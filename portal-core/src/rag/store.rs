//! Vector store abstraction and the batch helpers built on it.

use super::types::{EmbeddingRecord, IndexStats, QueryMatch};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found in environment variables.")]
    MissingApiKey(String),

    #[error("Vector store API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Index '{0}' did not become ready in time")]
    NotReady(String),

    #[error("Batch size must be greater than zero")]
    InvalidBatchSize,
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;

/// Operations the pipeline needs from a hosted vector index.
///
/// Implementations target one index and one namespace.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Writes records in one request, replacing any with the same id.
    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<usize>;

    /// Returns the `top_k` nearest records to `vector`, as ranked by the index.
    async fn query(&self, vector: &[f32], top_k: usize, include_metadata: bool) -> Result<Vec<QueryMatch>>;

    async fn describe_stats(&self) -> Result<IndexStats>;
}

/// Upserts `records` in contiguous batches of `batch_size`, one request each.
///
/// Stops at the first failed batch; earlier batches stay written.
/// Returns the number of records written.
pub async fn upsert_in_batches(
    store: &dyn VectorStore,
    records: &[EmbeddingRecord],
    batch_size: usize,
) -> Result<usize> {
    if batch_size == 0 {
        return Err(VectorStoreError::InvalidBatchSize);
    }

    let total_batches = records.len().div_ceil(batch_size);
    let mut written = 0;
    for (i, batch) in records.chunks(batch_size).enumerate() {
        store.upsert(batch).await?;
        written += batch.len();
        info!(batch = i + 1, total_batches, records = batch.len(), "Upserted batch");
    }
    Ok(written)
}

/// Loads every `*.json` embedding record in `dir`, sorted by file name.
///
/// Files that cannot be read or decoded, or that lack `id`/`values`, are
/// skipped with a warning. A missing directory yields an empty list.
pub async fn load_vectors(dir: &Path) -> Vec<EmbeddingRecord> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Could not read embeddings directory");
            return Vec::new();
        }
    };

    let mut paths = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Error listing embeddings directory");
                break;
            }
        }
    }
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let parsed = fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())
            .and_then(|contents| serde_json::from_str::<EmbeddingRecord>(&contents).map_err(|e| e.to_string()));
        match parsed {
            Ok(record) => records.push(record),
            Err(e) => warn!(file = %path.display(), error = %e, "Skipping embedding file"),
        }
    }

    info!(count = records.len(), dir = %dir.display(), "Loaded embedding files");
    records
}
