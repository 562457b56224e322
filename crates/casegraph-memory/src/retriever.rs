use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::RetrievalBackend;
use casegraph_core::types::RetrievalHit;

use crate::embeddings::EmbeddingProvider;
use crate::index::IndexStore;

/// Retrieval over per-corpus indexes: embed the query, then rank by cosine similarity.
pub struct EmbeddingRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: IndexStore,
}

impl EmbeddingRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: IndexStore) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }
}

impl RetrievalBackend for EmbeddingRetriever {
    fn query(
        &self,
        corpus: &str,
        query: &str,
        k: usize,
    ) -> BoxFuture<'_, Result<Vec<RetrievalHit>>> {
        let corpus = corpus.to_string();
        let query = query.to_string();
        Box::pin(async move {
            // Resolve the index first so a missing corpus costs no embedding call.
            let index = self.store.get(&corpus).await?;

            let mut vectors = self.embedder.embed(&[query]).await?;
            let vector = vectors.pop().ok_or_else(|| {
                CaseGraphError::invalid_response("embedding", "no vector for query")
            })?;
            if let Some(dims) = index.dimensions() {
                if dims != vector.len() {
                    return Err(CaseGraphError::Fatal(format!(
                        "index '{}' has {}-dimensional vectors but the embedder returned {}",
                        corpus,
                        dims,
                        vector.len()
                    )));
                }
            }

            let hits = index.search(&vector, k);
            debug!(corpus = %corpus, k, hits = hits.len(), "Retrieved chunks");
            Ok(hits)
        })
    }
}
