use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use casegraph_core::config::WebSearchConfig;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::SearchBackend;
use casegraph_core::types::SearchHit;

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Web search via the Tavily API, with raw page content included.
pub struct TavilySearch {
    client: reqwest::Client,
    api_key: String,
    url: String,
}

impl TavilySearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            url: TAVILY_URL.to_string(),
        }
    }

    /// Point at a different endpoint (self-hosted proxy, test server).
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[derive(Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    raw_content: Option<String>,
}

impl From<TavilyResult> for SearchHit {
    fn from(r: TavilyResult) -> Self {
        SearchHit {
            title: r.title,
            url: r.url,
            raw_content: r.raw_content.filter(|c| !c.trim().is_empty()),
        }
    }
}

impl SearchBackend for TavilySearch {
    fn search(&self, query: String, max_results: usize) -> BoxFuture<'_, Result<Vec<SearchHit>>> {
        Box::pin(async move {
            let resp = self
                .client
                .post(&self.url)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": query,
                    "search_depth": "advanced",
                    "max_results": max_results,
                    "include_raw_content": true,
                }))
                .send()
                .await
                .map_err(|e| CaseGraphError::transient("web_search", e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(CaseGraphError::from_status("web_search", status, &body));
            }

            let body: TavilyResponse = resp
                .json()
                .await
                .map_err(|e| CaseGraphError::invalid_response("web_search", e.to_string()))?;

            let hits: Vec<SearchHit> = body
                .results
                .into_iter()
                .take(max_results)
                .map(SearchHit::from)
                .collect();
            debug!(hits = hits.len(), "Web search returned");
            Ok(hits)
        })
    }
}

/// Build the configured search backend, if any.
pub fn create_search(config: Option<&WebSearchConfig>) -> Result<Option<Arc<dyn SearchBackend>>> {
    let Some(config) = config else {
        return Ok(None);
    };
    match config.provider.as_str() {
        "tavily" => {
            if config.api_key.is_empty() {
                return Err(CaseGraphError::Config("web_search.api_key is empty".into()));
            }
            Ok(Some(Arc::new(TavilySearch::new(config.api_key.clone()))))
        }
        other => Err(CaseGraphError::Config(format!(
            "unknown web_search provider '{}'",
            other
        ))),
    }
}
