//! Nearest-neighbour lookup over embedded policy chunks.
//!
//! [`VectorIndex`] is the seam the retriever queries. [`MemoryIndex`] is a
//! brute-force cosine index persisted as a JSON file, suitable for small policy
//! corpora and tests; the LanceDB-backed index lives behind the `lancedb` feature.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StoreError;

/// One nearest-neighbour hit. Larger `score` means more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatch {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Return up to `k` entries nearest to `vector`, best match first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>, StoreError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize, StoreError>;
}

/// A stored policy chunk with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub source: String,
    pub page: Option<u32>,
    pub vector: Vec<f32>,
}

/// Brute-force cosine-similarity index held in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    entries: Vec<IndexEntry>,
    dim: Option<usize>,
}

impl MemoryIndex {
    /// Build an index from entries. All vectors must share one dimension.
    pub fn from_entries(entries: Vec<IndexEntry>) -> Result<Self, StoreError> {
        let dim = entries.first().map(|e| e.vector.len());
        if let Some(expected) = dim {
            if let Some(bad) = entries.iter().find(|e| e.vector.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: bad.vector.len(),
                });
            }
        }
        Ok(Self { entries, dim })
    }

    /// Load an index previously written with [`MemoryIndex::save`].
    ///
    /// A missing, unreadable, or corrupt file is reported as
    /// [`StoreError::IndexUnavailable`].
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| StoreError::unavailable(path, e))?;
        let entries: Vec<IndexEntry> =
            serde_json::from_str(&raw).map_err(|e| StoreError::unavailable(path, e))?;
        let index = Self::from_entries(entries).map_err(|e| StoreError::unavailable(path, e))?;
        info!(path = %path.display(), rows = index.entries.len(), "loaded in-memory policy index");
        Ok(index)
    }

    /// Write the index as JSON, replacing `path` atomically.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let dir = parent_dir(path);
        let json = serde_json::to_vec(&self.entries)?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(&dir).map_err(|e| StoreError::persistence(&dir, e))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| StoreError::persistence(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| StoreError::persistence(path, e.error))?;
        Ok(())
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn dim(&self) -> Option<usize> {
        self.dim
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<IndexMatch>, StoreError> {
        let Some(dim) = self.dim else {
            return Ok(Vec::new());
        };
        if vector.len() != dim {
            return Err(StoreError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_sim(vector, &e.vector)))
            .collect();

        // Stable sort: ties keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| {
                let entry = &self.entries[i];
                IndexMatch {
                    text: entry.text.clone(),
                    source: entry.source.clone(),
                    page: entry.page,
                    score,
                }
            })
            .collect())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.entries.len())
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
