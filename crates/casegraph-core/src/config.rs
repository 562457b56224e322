use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CaseGraphError, Result};

/// Top-level casegraph configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub embedding: Option<EmbeddingConfig>,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub translation: Option<TranslationConfig>,
    #[serde(default)]
    pub web_search: Option<WebSearchConfig>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.0 }
fn default_request_timeout() -> u64 { 120 }

/// Bounded exponential backoff applied to every collaborator call.
///
/// The i-th retry (0-indexed) waits `min(base * 2^i, max)` scaled by a
/// random factor in `[1.0, 1.0 + jitter_fraction)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt (total calls = max_attempts + 1).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter_fraction: default_jitter_fraction(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_ms = base.as_millis() as u64;
        self.max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Total number of calls the policy permits.
    pub fn total_calls(&self) -> u32 {
        self.max_attempts.saturating_add(1)
    }

    /// `jitter_fraction` must be a finite value in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(CaseGraphError::Config(format!(
                "retry.jitter_fraction must be between 0 and 1, got {}",
                self.jitter_fraction
            )));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay() -> u64 { 1000 }
fn default_max_delay() -> u64 { 60_000 }
fn default_jitter_fraction() -> f64 { 0.1 }

/// Embedding model configuration for the retrieval indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Must match the model the indexes were built with.
    pub model: String,
    /// Any `/embeddings` endpoint speaking the OpenAI wire format.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_dims")]
    pub dimensions: usize,
}

fn default_embedding_dims() -> usize { 1536 }

/// Where the per-corpus vector indexes live and how many hits to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_dir: default_index_dir(),
            top_k: default_top_k(),
        }
    }
}

fn default_index_dir() -> String { "indexes".to_string() }
fn default_top_k() -> usize { 5 }

/// Google Cloud Translation (v3) settings. When absent, text passes through untranslated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    pub project_id: String,
    /// OAuth access token used as a bearer credential.
    pub api_key: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

fn default_location() -> String { "global".to_string() }
fn default_target_language() -> String { "en".to_string() }

/// Web search provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_search_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_search_results")]
    pub max_results: usize,
}

fn default_search_provider() -> String { "tavily".to_string() }
fn default_search_results() -> usize { 5 }

/// Document ingestion. Without an extraction service only plain text is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Endpoint that accepts a multipart `file` and answers `{"text": "..."}`.
    #[serde(default)]
    pub extraction_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String { "0.0.0.0:8000".to_string() }
fn default_max_upload_bytes() -> usize { 20 * 1024 * 1024 }

impl AppConfig {
    /// Reads a TOML file, substituting `${VAR}` references first.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|_| CaseGraphError::ConfigNotFound(path.display().to_string()))?;
        let config: Self = toml::from_str(&expand_env_vars(&raw))
            .map_err(|e| CaseGraphError::Config(e.to_string()))?;
        config.retry.validate()?;
        Ok(config)
    }

    /// Resolve the retrieval index directory (expand ~).
    pub fn index_dir(&self) -> PathBuf {
        let dir = &self.retrieval.index_dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }
}

/// Substitutes `${NAME}` with the value of `NAME`. Unset variables and an
/// unterminated `${` are left as written.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(&rest[open..open + close + 3]),
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
