//! Embeds snapshot chunks and replaces the vector store contents.

use crate::embedder::{EmbedError, Embedder};
use crate::program::CurriculumChunk;
use crate::snapshot::ProgramSnapshot;
use crate::store::{EmbeddingRecord, StoreError, VectorStore};

/// Errors raised while building the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// No chunks to index.
    #[error("no chunks to index; run the collector first")]
    Empty,
    /// Embedding failed.
    #[error(transparent)]
    Embed(#[from] EmbedError),
    /// Store replacement failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of an indexing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReport {
    /// Programs indexed.
    pub programs: usize,
    /// Records written.
    pub records: usize,
    /// Embedding dimensionality.
    pub dimensions: usize,
}

/// Embeds every chunk of every snapshot and swaps the store contents.
pub async fn build_index(
    snapshots: &[ProgramSnapshot],
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> Result<IndexReport, IndexError> {
    let chunks: Vec<CurriculumChunk> = snapshots
        .iter()
        .flat_map(ProgramSnapshot::curriculum_chunks)
        .collect();
    if chunks.is_empty() {
        return Err(IndexError::Empty);
    }

    let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;
    if vectors.len() != chunks.len() {
        return Err(EmbedError::CountMismatch {
            expected: chunks.len(),
            got: vectors.len(),
        }
        .into());
    }
    let dimensions = vectors.first().map_or(0, Vec::len);

    let records: Vec<EmbeddingRecord> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, embedding)| EmbeddingRecord { chunk, embedding })
        .collect();
    let count = records.len();
    store.replace_all(records).await?;

    let report = IndexReport {
        programs: snapshots.len(),
        records: count,
        dimensions,
    };
    tracing::info!(
        programs = report.programs,
        records = report.records,
        dimensions = report.dimensions,
        "index rebuilt"
    );
    Ok(report)
}
