use thiserror::Error;

/// Structural problems found while building a workflow graph.
///
/// These are raised once, at build time, and never while a run is in flight.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("workflow graph has no nodes")]
    EmptyGraph,

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("edge {edge_from} -> {edge_to} references unknown node '{missing}'")]
    UnknownNode {
        edge_from: String,
        edge_to: String,
        missing: String,
    },

    #[error("node '{0}' has an edge to itself")]
    SelfLoop(String),

    #[error("entry '{0}' is not a node without predecessors")]
    InvalidEntry(String),

    #[error("cycle detected through nodes: {}", nodes.join(", "))]
    Cycle { nodes: Vec<String> },

    #[error("nodes unreachable from any source: {}", nodes.join(", "))]
    Unreachable { nodes: Vec<String> },

    #[error("key '{key}' is produced by '{first}' and '{second}', which may run concurrently")]
    ConcurrentWriters {
        key: String,
        first: String,
        second: String,
    },
}

#[derive(Debug, Error)]
pub enum CaseGraphError {
    // Workflow errors
    #[error("node '{node}' is missing required input '{key}'")]
    Validation { node: String, key: String },

    #[error("node '{node}' wrote undeclared key '{key}'")]
    UndeclaredOutput { node: String, key: String },

    #[error("invalid workflow graph: {0}")]
    Graph(#[from] GraphError),

    // Collaborator errors
    #[error("{service} call failed: {message}")]
    TransientService { service: String, message: String },

    #[error("{service} returned an unusable response: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("{operation} failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        last: Box<CaseGraphError>,
    },

    #[error("merging duplicates for '{key}' failed: {source}")]
    Merge {
        key: String,
        #[source]
        source: Box<CaseGraphError>,
    },

    #[error("retrieval index not found: {0}")]
    IndexNotFound(String),

    #[error("{0}")]
    Fatal(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CaseGraphError {
    /// Shorthand for a transient collaborator failure.
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a collaborator response that could not be used.
    pub fn invalid_response(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Classify a non-success HTTP status from a collaborator.
    ///
    /// Rate limits, timeouts and server errors are transient; other client
    /// errors mean the request itself is wrong and will not improve on retry.
    pub fn from_status(service: &str, status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate_body(body));
        match status {
            408 | 409 | 425 | 429 | 500..=599 => Self::transient(service, message),
            _ => Self::Fatal(format!("{} rejected the request: {}", service, message)),
        }
    }

    /// Whether a retry wrapper may attempt the operation again.
    ///
    /// Anything not explicitly classified as fatal is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Validation { .. }
                | Self::UndeclaredOutput { .. }
                | Self::Graph(_)
                | Self::ExhaustedRetries { .. }
                | Self::Merge { .. }
                | Self::IndexNotFound(_)
                | Self::Fatal(_)
                | Self::Config(_)
                | Self::ConfigNotFound(_)
        )
    }

    /// The innermost failure, looking through retry and merge wrappers.
    pub fn root_cause(&self) -> &CaseGraphError {
        match self {
            Self::ExhaustedRetries { last, .. } => last.root_cause(),
            Self::Merge { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CaseGraphError>;

fn truncate_body(body: &str) -> &str {
    match body.char_indices().nth(300) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
