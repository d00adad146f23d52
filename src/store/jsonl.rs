//! File-backed store: one JSON record per line, searched in memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    cosine_similarity, ensure_uniform_dimensions, EmbeddingRecord, ScoredRecord, StoreError,
    VectorStore,
};
use crate::program::ProgramId;

/// JSONL-backed [`VectorStore`] with brute-force cosine search.
pub struct JsonlStore {
    path: PathBuf,
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl JsonlStore {
    /// Opens the store at `path`; a missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = if path.exists() {
            load_records(&path)?
        } else {
            Vec::new()
        };
        tracing::debug!(path = %path.display(), records = records.len(), "opened jsonl store");
        Ok(Self {
            path,
            records: RwLock::new(records),
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn load_records(path: &Path) -> Result<Vec<EmbeddingRecord>, StoreError> {
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl VectorStore for JsonlStore {
    async fn replace_all(&self, records: Vec<EmbeddingRecord>) -> Result<(), StoreError> {
        ensure_uniform_dimensions(&records)?;

        let mut buf = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut buf, record).map_err(StoreError::Encode)?;
            buf.push(b'\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, &buf)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| StoreError::Io {
                path: self.path.clone(),
                source,
            })?;

        let count = records.len();
        *self.records.write().await = records;
        tracing::info!(path = %self.path.display(), records = count, "replaced jsonl store");
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        program: Option<ProgramId>,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let records = self.records.read().await;
        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .filter(|record| program.map_or(true, |p| record.chunk.program == p))
            .map(|record| ScoredRecord {
                chunk: record.chunk.clone(),
                score: cosine_similarity(query, &record.embedding),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().await.len())
    }
}
