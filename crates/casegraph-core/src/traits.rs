//! Collaborator interfaces consumed by workflow nodes.
//!
//! Every collaborator is treated as a stateless, reentrant service. Calls may
//! fail transiently; callers wrap them with a retry policy.

use futures::future::BoxFuture;

use crate::error::{CaseGraphError, Result};
use crate::types::{ResponseShape, RetrievalHit, RunId, SearchHit, StoredResult, Structured};

/// LLM inference: turns a prompt into a structured JSON object.
pub trait InferenceBackend: Send + Sync + 'static {
    /// Backend name used in logs and errors.
    fn name(&self) -> &str;

    /// Run a prompt and return an object matching `shape`.
    fn infer(&self, prompt: String, shape: ResponseShape) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Run a prompt and return free-form text.
    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String>>;
}

/// Request a typed object from an inference backend.
///
/// A response that does not deserialize into `T` is an `InvalidResponse`,
/// which the retry wrapper treats as transient.
pub async fn infer_as<T: Structured>(backend: &dyn InferenceBackend, prompt: String) -> Result<T> {
    let shape = T::shape();
    let shape_name = shape.name.clone();
    let value = backend.infer(prompt, shape).await?;
    serde_json::from_value(value).map_err(|e| {
        CaseGraphError::invalid_response(
            backend.name(),
            format!("response does not match '{}': {}", shape_name, e),
        )
    })
}

/// Vector-similarity retrieval over a named corpus.
pub trait RetrievalBackend: Send + Sync + 'static {
    /// Return up to `k` hits ranked by descending score.
    ///
    /// Fails with `IndexNotFound` when the corpus has no index.
    fn query(&self, corpus: &str, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<RetrievalHit>>>;
}

/// Machine translation into the configured target language.
pub trait TranslationBackend: Send + Sync + 'static {
    fn translate(&self, text: String) -> BoxFuture<'_, Result<String>>;
}

/// Web search returning titles, URLs and raw page content.
pub trait SearchBackend: Send + Sync + 'static {
    fn search(&self, query: String, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>>;
}

/// Document ingestion: raw uploaded bytes to plain text.
pub trait DocumentReader: Send + Sync + 'static {
    fn read(&self, filename: String, bytes: Vec<u8>) -> BoxFuture<'_, Result<String>>;
}

/// Process-scoped store of finished runs, keyed by run id.
pub trait ResultStore: Send + Sync + 'static {
    fn put(&self, result: StoredResult) -> BoxFuture<'_, Result<()>>;

    fn get(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<StoredResult>>>;
}
