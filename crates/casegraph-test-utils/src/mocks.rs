use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;

use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::{
    DocumentReader, InferenceBackend, RetrievalBackend, SearchBackend, TranslationBackend,
};
use casegraph_core::types::{ResponseShape, RetrievalHit, SearchHit};

/// Shape name under which `complete()` calls are scripted and logged.
pub const COMPLETE: &str = "complete";

type Handler = Arc<dyn Fn(&str) -> Result<Value> + Send + Sync>;

/// One recorded inference call.
#[derive(Debug, Clone)]
pub struct InferenceCall {
    pub shape: String,
    pub prompt: String,
}

/// Inference backend scripted per response shape.
///
/// Queued responses are consumed first, then the shape's standing handler.
/// A shape with neither fails with `Fatal` so missing scripts surface fast.
#[derive(Default)]
pub struct MockInference {
    queued: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<InferenceCall>>,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `shape` with `value`.
    pub fn respond(self, shape: &str, value: Value) -> Self {
        self.respond_with(shape, move |_| Ok(value.clone()))
    }

    /// Answer `shape` by running `f` on the prompt.
    pub fn respond_with<F>(self, shape: &str, f: F) -> Self
    where
        F: Fn(&str) -> Result<Value> + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .unwrap()
            .insert(shape.to_string(), Arc::new(f));
        self
    }

    /// Queue a one-off response for `shape`.
    pub fn enqueue(self, shape: &str, response: Result<Value>) -> Self {
        self.queued
            .lock()
            .unwrap()
            .entry(shape.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Fail the next `n` calls for `shape` with a transient error.
    pub fn fail_next(mut self, shape: &str, n: u32) -> Self {
        for i in 0..n {
            self = self.enqueue(
                shape,
                Err(CaseGraphError::transient("mock", format!("scripted failure {}", i + 1))),
            );
        }
        self
    }

    pub fn calls(&self) -> Vec<InferenceCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, shape: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.shape == shape)
            .count()
    }

    pub fn prompts(&self, shape: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.shape == shape)
            .map(|c| c.prompt.clone())
            .collect()
    }

    fn answer(&self, shape: &str, prompt: &str) -> Result<Value> {
        self.calls.lock().unwrap().push(InferenceCall {
            shape: shape.to_string(),
            prompt: prompt.to_string(),
        });
        if let Some(next) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(shape)
            .and_then(|q| q.pop_front())
        {
            return next;
        }
        let handler = self.handlers.lock().unwrap().get(shape).cloned();
        match handler {
            Some(h) => h(prompt),
            None => Err(CaseGraphError::Fatal(format!(
                "no scripted response for shape '{}'",
                shape
            ))),
        }
    }
}

impl InferenceBackend for MockInference {
    fn name(&self) -> &str {
        "mock"
    }

    fn infer(&self, prompt: String, shape: ResponseShape) -> BoxFuture<'_, Result<Value>> {
        Box::pin(async move { self.answer(&shape.name, &prompt) })
    }

    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let value = self.answer(COMPLETE, &prompt)?;
            match value {
                Value::String(s) => Ok(s),
                other => Ok(other.to_string()),
            }
        })
    }
}

/// Build a retrieval hit from chunk text plus metadata fields.
pub fn chunk(content: &str, fields: Value, score: f32) -> RetrievalHit {
    let mut chunk = match fields {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    chunk.insert("content".into(), Value::String(content.to_string()));
    RetrievalHit {
        chunk: Value::Object(chunk),
        score,
    }
}

/// Retrieval backend over fixed per-corpus hit lists.
///
/// Unknown corpora fail with `IndexNotFound`.
#[derive(Default)]
pub struct MockRetrieval {
    corpora: HashMap<String, Vec<RetrievalHit>>,
    failures: AtomicU32,
    queries: Mutex<Vec<(String, String, usize)>>,
}

impl MockRetrieval {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corpus(mut self, corpus: &str, hits: Vec<RetrievalHit>) -> Self {
        self.corpora.insert(corpus.to_string(), hits);
        self
    }

    /// Fail the next `n` queries (any corpus) with a transient error.
    pub fn fail_next(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// Recorded `(corpus, query, k)` triples.
    pub fn queries(&self) -> Vec<(String, String, usize)> {
        self.queries.lock().unwrap().clone()
    }

    pub fn queries_for(&self, corpus: &str) -> usize {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _)| c == corpus)
            .count()
    }
}

impl RetrievalBackend for MockRetrieval {
    fn query(&self, corpus: &str, query: &str, k: usize) -> BoxFuture<'_, Result<Vec<RetrievalHit>>> {
        self.queries
            .lock()
            .unwrap()
            .push((corpus.to_string(), query.to_string(), k));
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if failing {
            Err(CaseGraphError::transient("retrieval", "scripted failure"))
        } else {
            match self.corpora.get(corpus) {
                Some(hits) => Ok(hits.iter().take(k).cloned().collect()),
                None => Err(CaseGraphError::IndexNotFound(corpus.to_string())),
            }
        };
        Box::pin(async move { result })
    }
}

/// Translator that returns a fixed text, or its input when none is set.
#[derive(Default)]
pub struct MockTranslation {
    output: Option<String>,
    failures: AtomicU32,
    inputs: Mutex<Vec<String>>,
}

impl MockTranslation {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn fixed(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            ..Self::default()
        }
    }

    pub fn fail_next(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

impl TranslationBackend for MockTranslation {
    fn translate(&self, text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.inputs.lock().unwrap().push(text.clone());
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CaseGraphError::transient("translation", "scripted failure"));
            }
            Ok(self.output.clone().unwrap_or(text))
        })
    }
}

/// Web search returning a fixed hit list.
#[derive(Default)]
pub struct MockSearch {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<(String, usize)>>,
}

impl MockSearch {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            hits,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }
}

impl SearchBackend for MockSearch {
    fn search(&self, query: String, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            self.queries.lock().unwrap().push((query, max_results));
            Ok(self.hits.iter().take(max_results).cloned().collect())
        })
    }
}

/// Document reader that decodes bytes as lossy UTF-8 and records filenames.
#[derive(Default)]
pub struct MockReader {
    files: Mutex<Vec<String>>,
}

impl MockReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> Vec<String> {
        self.files.lock().unwrap().clone()
    }
}

impl DocumentReader for MockReader {
    fn read(&self, filename: String, bytes: Vec<u8>) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.files.lock().unwrap().push(filename);
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }
}
