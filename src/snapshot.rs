//! Per-program collector output persisted between pipeline stages.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::collector::CollectError;
use crate::normalizer::{NormalizedChunk, PageMetadata, SectionHeading};
use crate::program::{ChunkKind, CurriculumChunk, ProgramId, ProgramProfile};

/// Everything the collector learned about one program page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSnapshot {
    /// Program the page describes.
    pub program: ProgramId,
    /// Fetch metadata (status, checksum, fetch time).
    pub metadata: PageMetadata,
    /// Structured profile extracted from the page.
    pub profile: ProgramProfile,
    /// Normalized page chunks.
    pub chunks: Vec<NormalizedChunk>,
}

impl ProgramSnapshot {
    /// Retrievable units for this program: page chunks, the profile
    /// summary, then one chunk per course.
    pub fn curriculum_chunks(&self) -> Vec<CurriculumChunk> {
        let url = self.metadata.url.clone();
        let mut out = Vec::with_capacity(self.chunks.len() + 1 + self.profile.courses.len());

        for chunk in &self.chunks {
            out.push(CurriculumChunk {
                program: self.program,
                source_url: url.clone(),
                section: chunk.section_path.clone(),
                kind: ChunkKind::General,
                ordinal: out.len(),
                course: None,
                text: chunk.text.clone(),
                token_estimate: chunk.token_estimate,
            });
        }

        let summary = self.profile.render_summary();
        out.push(CurriculumChunk {
            program: self.program,
            source_url: url.clone(),
            section: vec![SectionHeading {
                level: 1,
                title: self.profile.name.clone(),
            }],
            kind: ChunkKind::General,
            ordinal: out.len(),
            course: None,
            token_estimate: crate::normalizer::estimate_tokens(&summary),
            text: summary,
        });

        for course in &self.profile.courses {
            let text = course.render();
            out.push(CurriculumChunk {
                program: self.program,
                source_url: url.clone(),
                section: Vec::new(),
                kind: ChunkKind::Course,
                ordinal: out.len(),
                course: Some(course.name.clone()),
                token_estimate: crate::normalizer::estimate_tokens(&text),
                text,
            });
        }

        out
    }
}

/// Path of the snapshot file for `program` inside `data_dir`.
pub fn snapshot_path(data_dir: &Path, program: ProgramId) -> PathBuf {
    data_dir.join(format!("{}.json", program.slug()))
}

/// Writes `snapshot` as pretty JSON, creating `data_dir` when needed.
pub fn write_snapshot(
    data_dir: &Path,
    snapshot: &ProgramSnapshot,
) -> Result<PathBuf, CollectError> {
    fs::create_dir_all(data_dir).map_err(|source| CollectError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;
    let path = snapshot_path(data_dir, snapshot.program);
    let json = serde_json::to_vec_pretty(snapshot).map_err(|source| CollectError::Snapshot {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(|source| CollectError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Reads the snapshot for `program`.
pub fn read_snapshot(data_dir: &Path, program: ProgramId) -> Result<ProgramSnapshot, CollectError> {
    let path = snapshot_path(data_dir, program);
    let bytes = fs::read(&path).map_err(|source| CollectError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| CollectError::Snapshot { path, source })
}

/// Reads every program snapshot, failing on the first missing one.
pub fn read_all_snapshots(data_dir: &Path) -> Result<Vec<ProgramSnapshot>, CollectError> {
    ProgramId::ALL
        .iter()
        .map(|&program| read_snapshot(data_dir, program))
        .collect()
}
