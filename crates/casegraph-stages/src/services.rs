use std::sync::Arc;

use casegraph_core::config::RetryPolicy;
use casegraph_core::traits::{
    DocumentReader, InferenceBackend, RetrievalBackend, SearchBackend, TranslationBackend,
};

/// Collaborators shared by every stage of a case workflow.
#[derive(Clone)]
pub struct Services {
    pub inference: Arc<dyn InferenceBackend>,
    pub retrieval: Arc<dyn RetrievalBackend>,
    pub translation: Arc<dyn TranslationBackend>,
    pub reader: Arc<dyn DocumentReader>,
    /// Web search; the precedent stage is left out of the graph without it.
    pub search: Option<Arc<dyn SearchBackend>>,
    /// Applied to every collaborator call.
    pub retry: RetryPolicy,
    /// Hits fetched per retrieval query.
    pub top_k: usize,
    pub search_results: usize,
}

impl Services {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        retrieval: Arc<dyn RetrievalBackend>,
        translation: Arc<dyn TranslationBackend>,
        reader: Arc<dyn DocumentReader>,
    ) -> Self {
        Self {
            inference,
            retrieval,
            translation,
            reader,
            search: None,
            retry: RetryPolicy::default(),
            top_k: 5,
            search_results: 5,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn SearchBackend>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_search_results(mut self, n: usize) -> Self {
        self.search_results = n;
        self
    }
}
