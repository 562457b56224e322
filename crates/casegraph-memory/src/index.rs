//! On-disk vector indexes, one JSON-lines file per corpus.
//!
//! Each line of `<index_dir>/<corpus>.jsonl` is `{"chunk": {...}, "embedding": [...]}`.
//! The chunk is opaque apart from its `content` field, which is what gets embedded.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::types::RetrievalHit;

use crate::embeddings::{cosine_similarity, EmbeddingProvider};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: serde_json::Value,
    pub embedding: Vec<f32>,
}

/// A brute-force cosine-similarity index held in memory.
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON-lines index. Blank lines are skipped.
    pub fn parse(source: &str, content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: IndexEntry = serde_json::from_str(line).map_err(|e| {
                CaseGraphError::Fatal(format!("{}:{}: bad index entry: {}", source, lineno + 1, e))
            })?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector width, taken from the first entry.
    pub fn dimensions(&self) -> Option<usize> {
        self.entries.first().map(|e| e.embedding.len())
    }

    /// Top `k` entries by descending cosine similarity.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievalHit> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|e| (cosine_similarity(query, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(score, e)| RetrievalHit {
                chunk: e.chunk.clone(),
                score,
            })
            .collect()
    }

    /// Embed chunks in batches and build an index from them.
    ///
    /// Chunks without a string `content` field are rejected.
    pub async fn build(
        embedder: &dyn EmbeddingProvider,
        chunks: Vec<serde_json::Value>,
        batch_size: usize,
    ) -> Result<Self> {
        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(batch_size.max(1)) {
            let texts = batch
                .iter()
                .enumerate()
                .map(|(i, chunk)| {
                    chunk
                        .get("content")
                        .and_then(|v| v.as_str())
                        .map(String::from)
                        .ok_or_else(|| {
                            CaseGraphError::Fatal(format!(
                                "chunk {} has no string 'content' field",
                                entries.len() + i
                            ))
                        })
                })
                .collect::<Result<Vec<_>>>()?;
            let vectors = embedder.embed(&texts).await?;
            for (chunk, embedding) in batch.iter().zip(vectors) {
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    embedding,
                });
            }
            debug!(embedded = entries.len(), total = chunks.len(), "Embedded batch");
        }
        Ok(Self { entries })
    }

    /// Write as JSON lines, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut file, entry)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }
}

/// Loads corpus indexes from a directory on first use and keeps them.
pub struct IndexStore {
    dir: PathBuf,
    loaded: RwLock<HashMap<String, Arc<VectorIndex>>>,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, corpus: &str) -> Result<PathBuf> {
        let valid = !corpus.is_empty()
            && corpus
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(CaseGraphError::Fatal(format!(
                "invalid corpus name: {:?}",
                corpus
            )));
        }
        Ok(self.dir.join(format!("{}.jsonl", corpus)))
    }

    /// The index for `corpus`, loading it on first request.
    pub async fn get(&self, corpus: &str) -> Result<Arc<VectorIndex>> {
        if let Some(index) = self.loaded.read().await.get(corpus) {
            return Ok(index.clone());
        }

        let path = self.path_for(corpus)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CaseGraphError::IndexNotFound(corpus.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let index = Arc::new(VectorIndex::parse(&path.display().to_string(), &content)?);
        info!(corpus, entries = index.len(), "Loaded retrieval index");

        let mut loaded = self.loaded.write().await;
        Ok(loaded
            .entry(corpus.to_string())
            .or_insert(index)
            .clone())
    }

    /// Corpus names with an index file present, sorted.
    pub fn available(&self) -> Vec<String> {
        let Ok(read_dir) = std::fs::read_dir(&self.dir) else {
            return vec![];
        };
        let mut names: Vec<String> = read_dir
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                if path.extension().and_then(|x| x.to_str()) == Some("jsonl") {
                    path.file_stem().and_then(|s| s.to_str()).map(String::from)
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }
}
