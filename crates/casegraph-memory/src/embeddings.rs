use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use casegraph_core::config::EmbeddingConfig;
use casegraph_core::error::{CaseGraphError, Result};

/// Turns chunk text and search queries into vectors of a fixed width.
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Embed a batch of texts into vectors, one per input, in order.
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;
    fn dimensions(&self) -> usize;
}

/// Calls an OpenAI-style `/embeddings` endpoint.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dims: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(base_url: &str, api_key: Option<&str>, model: &str, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(String::from),
            model: model.to_string(),
            dims,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = match (&config.base_url, config.provider.as_str()) {
            (Some(url), _) => url.clone(),
            (None, "openai") => "https://api.openai.com/v1".to_string(),
            (None, "ollama") => "http://localhost:11434/v1".to_string(),
            (None, other) => {
                return Err(CaseGraphError::Config(format!(
                    "embedding provider '{}' needs embedding.base_url",
                    other
                )))
            }
        };
        Ok(Self::new(
            &base_url,
            config.api_key.as_deref().filter(|k| !k.is_empty()),
            &config.model,
            config.dimensions,
        ))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        let texts = texts.to_vec();
        Box::pin(async move {
            let url = format!("{}/embeddings", self.base_url);
            let expected = texts.len();

            let mut req = self.client.post(&url).json(&EmbeddingRequest {
                model: self.model.clone(),
                input: texts,
            });

            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| CaseGraphError::transient("embedding", e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                return Err(CaseGraphError::from_status("embedding", status, &body));
            }

            let body: EmbeddingResponse = resp
                .json()
                .await
                .map_err(|e| CaseGraphError::invalid_response("embedding", e.to_string()))?;

            if body.data.len() != expected {
                return Err(CaseGraphError::invalid_response(
                    "embedding",
                    format!("expected {} vectors, got {}", expected, body.data.len()),
                ));
            }
            Ok(body.data.into_iter().map(|d| d.embedding).collect())
        })
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Cosine of the angle between `a` and `b`; 0.0 for mismatched widths or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });
    let norms = (aa * bb).sqrt();
    if norms == 0.0 {
        return 0.0;
    }
    dot / norms
}
