use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one workflow invocation.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Describes the JSON object an inference call must return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseShape {
    /// Short identifier, also used as the schema name.
    pub name: String,
    /// JSON Schema for the expected object.
    pub schema: serde_json::Value,
}

impl ResponseShape {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

/// A type that can be requested from the inference backend.
pub trait Structured: DeserializeOwned + Send + 'static {
    fn shape() -> ResponseShape;
}

/// A structured record that can be grouped with its logical duplicates.
///
/// Grouping uses literal string equality on the key; no normalisation.
pub trait DedupRecord: Clone + Send + Sync + 'static {
    fn dedup_key(&self) -> &str;
}

/// One ranked hit from the retrieval backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    /// The stored chunk with whatever metadata its corpus carries.
    pub chunk: serde_json::Value,
    pub score: f32,
}

impl RetrievalHit {
    /// The chunk's text content, if it has any.
    pub fn content(&self) -> Option<&str> {
        self.chunk.get("content").and_then(|v| v.as_str())
    }

    /// A string metadata field of the chunk.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.chunk.get(name).and_then(|v| v.as_str())
    }
}

/// One result from the web-search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub raw_content: Option<String>,
}

/// A finished run as kept by the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResult {
    pub run_id: RunId,
    pub stored_at: DateTime<Utc>,
    pub state: serde_json::Value,
}

/// Progress notifications emitted while a workflow runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    NodeStarted {
        node_id: String,
    },
    NodeCompleted {
        node_id: String,
        keys: Vec<String>,
        elapsed_ms: u64,
    },
    NodeFailed {
        node_id: String,
        error: String,
    },
    RunFinished {
        succeeded: bool,
        elapsed_ms: u64,
    },
}
