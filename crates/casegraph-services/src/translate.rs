use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use casegraph_core::config::TranslationConfig;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::traits::TranslationBackend;

const TRANSLATE_API: &str = "https://translation.googleapis.com/v3";

/// Request payloads are kept under the API's per-request codepoint limit.
const MAX_CHARS_PER_REQUEST: usize = 25_000;

/// Google Cloud Translation v3 over REST.
pub struct GoogleTranslator {
    client: reqwest::Client,
    config: TranslationConfig,
    base_url: String,
}

impl GoogleTranslator {
    pub fn new(config: TranslationConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            base_url: TRANSLATE_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}:translateText",
            self.base_url, self.config.project_id, self.config.location
        )
    }

    async fn translate_piece(&self, text: String) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&TranslateRequest {
                contents: vec![text],
                mime_type: "text/plain",
                target_language_code: &self.config.target_language,
            })
            .send()
            .await
            .map_err(|e| CaseGraphError::transient("translation", e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CaseGraphError::from_status("translation", status, &body));
        }

        let body: TranslateResponse = resp
            .json()
            .await
            .map_err(|e| CaseGraphError::invalid_response("translation", e.to_string()))?;
        body.translations
            .into_iter()
            .next()
            .map(|t| t.translated_text)
            .ok_or_else(|| CaseGraphError::invalid_response("translation", "no translations returned"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    contents: Vec<String>,
    mime_type: &'a str,
    target_language_code: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    translated_text: String,
}

impl TranslationBackend for GoogleTranslator {
    fn translate(&self, text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let pieces = split_for_requests(&text, MAX_CHARS_PER_REQUEST);
            debug!(chars = text.chars().count(), requests = pieces.len(), "Translating");
            let mut out = Vec::with_capacity(pieces.len());
            for piece in pieces {
                out.push(self.translate_piece(piece).await?);
            }
            Ok(out.join(""))
        })
    }
}

/// Leaves text untouched. Used when no translation service is configured.
pub struct PassthroughTranslator;

impl TranslationBackend for PassthroughTranslator {
    fn translate(&self, text: String) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Ok(text) })
    }
}

/// Build the configured translator, falling back to passthrough.
pub fn create_translator(config: Option<&TranslationConfig>) -> Arc<dyn TranslationBackend> {
    match config {
        Some(c) => Arc::new(GoogleTranslator::new(c.clone())),
        None => {
            info!("No translation configured; documents are used as written");
            Arc::new(PassthroughTranslator)
        }
    }
}

/// Split on line boundaries into pieces of at most `limit` characters.
/// A single line longer than `limit` is cut on character boundaries.
fn split_for_requests(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > limit && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for chunk in chars.chunks(limit) {
                pieces.push(chunk.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
