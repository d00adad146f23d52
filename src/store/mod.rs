//! Vector stores holding embedded curriculum chunks.
//!
//! Both backends are replaced wholesale on every indexing run; there is no
//! incremental upsert.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::program::{CurriculumChunk, ProgramId};

pub mod jsonl;
pub mod pgvector;

pub use jsonl::JsonlStore;
pub use pgvector::{PgVectorStore, TableName};

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    /// Chunk metadata and text.
    #[serde(flatten)]
    pub chunk: CurriculumChunk,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// The matching chunk.
    pub chunk: CurriculumChunk,
    /// Cosine similarity to the query, higher is closer.
    pub score: f32,
}

/// Errors raised by vector stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// File I/O failure.
    #[error("store I/O at {path:?}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Malformed JSONL line.
    #[error("invalid record at {path:?} line {line}: {source}")]
    Decode {
        /// Store file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// Record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
    /// Postgres failure.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
    /// Records or rows that violate store invariants.
    #[error("invalid record: {0}")]
    Invalid(String),
    /// Store cannot be opened with the given settings.
    #[error("invalid store configuration: {0}")]
    Config(String),
}

/// Storage and nearest-neighbour lookup for [`EmbeddingRecord`]s.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replaces the entire store contents with `records`.
    async fn replace_all(&self, records: Vec<EmbeddingRecord>) -> Result<(), StoreError>;

    /// Returns at most `k` records closest to `query`, best first,
    /// optionally restricted to one program.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        program: Option<ProgramId>,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// Cosine similarity; mismatched or zero-length vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub(crate) fn ensure_uniform_dimensions(
    records: &[EmbeddingRecord],
) -> Result<Option<usize>, StoreError> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    let dims = first.embedding.len();
    if dims == 0 {
        return Err(StoreError::Invalid("embedding vector is empty".into()));
    }
    if let Some(bad) = records.iter().find(|record| record.embedding.len() != dims) {
        return Err(StoreError::Invalid(format!(
            "chunk {} of {} has {} dimensions, expected {}",
            bad.chunk.ordinal,
            bad.chunk.program.slug(),
            bad.embedding.len(),
            dims
        )));
    }
    Ok(Some(dims))
}
