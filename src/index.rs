//! Index builder: chunk, optionally embed, and persist retrieval documents.
//!
//! An index is a directory holding a single `index.json` manifest:
//!
//! ```text
//! {index_dir}/{mr_id}/index.json
//! {docs_index_dir}/index.json
//! ```
//!
//! The manifest carries the source documents, their chunks, and (when an
//! embedder is configured) one vector per chunk. Querying the index is left
//! to the downstream RAG service that reads this directory.
//!
//! The manifest is written to a temporary file in the same directory and
//! renamed into place, so a reader never sees a half-written index.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use mrdoc_core::chunk::chunk_text;
use mrdoc_core::models::{Chunk, RetrievalDocument};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::embedding::Embedder;

pub const MANIFEST_FILE: &str = "index.json";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    pub built_at: DateTime<Utc>,
    pub embedding_model: Option<String>,
    pub dims: Option<usize>,
    /// SHA-256 over the chunk hashes, in order.
    pub content_hash: String,
    pub documents: Vec<RetrievalDocument>,
    pub chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    #[serde(flatten)]
    pub chunk: Chunk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// Counts reported after a build.
#[derive(Debug, Clone, Serialize)]
pub struct IndexSummary {
    pub path: PathBuf,
    pub documents: usize,
    pub chunks: usize,
    pub embedded: usize,
}

pub struct IndexBuilder {
    chunking: ChunkingConfig,
    embedder: Option<Arc<dyn Embedder>>,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(chunking: ChunkingConfig, embedder: Option<Arc<dyn Embedder>>, batch_size: usize) -> Self {
        Self {
            chunking,
            embedder,
            batch_size: batch_size.max(1),
        }
    }

    /// Chunk and embed `documents`, then persist the manifest under `dir`.
    pub async fn build(&self, documents: &[RetrievalDocument], dir: &Path) -> Result<IndexSummary> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| {
                chunk_text(
                    &doc.id,
                    &doc.text,
                    self.chunking.max_tokens,
                    self.chunking.overlap_tokens,
                )
            })
            .collect();

        let vectors = match &self.embedder {
            Some(embedder) => Some(self.embed_chunks(embedder.as_ref(), &chunks).await?),
            None => None,
        };

        let embedded = vectors.as_ref().map(Vec::len).unwrap_or(0);
        let indexed: Vec<IndexedChunk> = match vectors {
            Some(vectors) => chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexedChunk {
                    chunk,
                    vector: Some(vector),
                })
                .collect(),
            None => chunks
                .into_iter()
                .map(|chunk| IndexedChunk { chunk, vector: None })
                .collect(),
        };

        let manifest = IndexManifest {
            version: MANIFEST_VERSION,
            built_at: Utc::now(),
            embedding_model: self.embedder.as_ref().map(|e| e.model_name().to_string()),
            dims: self.embedder.as_ref().map(|e| e.dims()),
            content_hash: content_hash(&indexed),
            documents: documents.to_vec(),
            chunks: indexed,
        };

        let path = write_manifest(dir, &manifest)?;
        let summary = IndexSummary {
            path,
            documents: manifest.documents.len(),
            chunks: manifest.chunks.len(),
            embedded,
        };
        tracing::info!(
            dir = %dir.display(),
            documents = summary.documents,
            chunks = summary.chunks,
            embedded = summary.embedded,
            "index built"
        );
        Ok(summary)
    }

    async fn embed_chunks(&self, embedder: &dyn Embedder, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let batch_vectors = embedder.embed(&texts).await?;
            if batch_vectors.len() != batch.len() {
                bail!(
                    "embedder returned {} vectors for {} chunks",
                    batch_vectors.len(),
                    batch.len()
                );
            }
            if let Some(bad) = batch_vectors.iter().find(|v| v.len() != embedder.dims()) {
                bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    embedder.dims(),
                    bad.len()
                );
            }
            vectors.extend(batch_vectors);
        }
        Ok(vectors)
    }
}

fn content_hash(chunks: &[IndexedChunk]) -> String {
    let mut hasher = Sha256::new();
    for c in chunks {
        hasher.update(c.chunk.hash.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn write_manifest(dir: &Path, manifest: &IndexManifest) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

    let path = dir.join(MANIFEST_FILE);
    let tmp = dir.join(format!(".{}.{}.tmp", MANIFEST_FILE, Uuid::new_v4()));
    let json = serde_json::to_vec(manifest)?;

    std::fs::write(&tmp, json)
        .with_context(|| format!("Failed to write index: {}", tmp.display()))?;
    std::fs::rename(&tmp, &path)
        .with_context(|| format!("Failed to move index into place: {}", path.display()))?;

    Ok(path)
}

/// Read the manifest under `dir`. Returns `Ok(None)` if no index exists.
pub fn load_manifest(dir: &Path) -> Result<Option<IndexManifest>> {
    let path = dir.join(MANIFEST_FILE);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read index: {}", path.display())),
    };
    let manifest = serde_json::from_slice(&bytes)
        .with_context(|| format!("Corrupt index manifest: {}", path.display()))?;
    Ok(Some(manifest))
}
