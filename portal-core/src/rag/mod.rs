//! Offline retrieval pipeline: report embeddings and the hosted vector index.
//!
//! # Overview
//!
//! 1. **Embedding**: [`EmbeddingGenerator`] turns report paragraphs (and
//!    evaluation questions) into vectors, one cached JSON file per record.
//! 2. **Indexing**: [`load_vectors`] reads the cache back and
//!    [`upsert_in_batches`] writes it to a [`VectorStore`] such as
//!    [`PineconeIndex`].
//! 3. **Retrieval**: [`VectorStore::query`] returns the nearest records for a
//!    query vector.
//!
//! The live chat path does not consult the index; the model reads reports
//! through its tools instead.

mod embedder;
mod generator;
mod pinecone;
mod store;
mod types;

pub use embedder::{Embedder, EmbedderError};
pub use generator::{EmbeddingGenerator, EmbeddingSample, SAMPLE_SENTENCE};
pub use pinecone::{IndexDescription, IndexSpec, IndexStatus, PineconeClient, PineconeIndex};
pub use store::{load_vectors, upsert_in_batches, VectorStore, VectorStoreError};
pub use types::{
    EmbeddingRecord, GenerationSummary, IndexStats, NamespaceStats, QueryMatch, QuestionEmbedding, RecordMetadata,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Embedder error: {0}")]
    Embedder(#[from] EmbedderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;
