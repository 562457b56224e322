use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use casegraph_core::config::RetryPolicy;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::state::{PartialUpdate, WorkflowState};

use crate::retry::retry;

/// The work a node performs: a function from its input view of state to a
/// partial update.
pub trait NodeHandler: Send + Sync + 'static {
    fn run(&self, input: WorkflowState) -> BoxFuture<'_, Result<PartialUpdate>>;
}

struct FnHandler<F>(F);

impl<F, Fut> NodeHandler for FnHandler<F>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PartialUpdate>> + Send + 'static,
{
    fn run(&self, input: WorkflowState) -> BoxFuture<'_, Result<PartialUpdate>> {
        Box::pin((self.0)(input))
    }
}

/// Wrap an async closure as a node handler.
pub fn node_fn<F, Fut>(f: F) -> Arc<dyn NodeHandler>
where
    F: Fn(WorkflowState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PartialUpdate>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A node in the workflow graph.
///
/// Input keys define which parts of the shared state the node may see;
/// output keys define which parts it may write.
#[derive(Clone)]
pub struct Node {
    /// Unique identifier for this node.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Keys that must be present before the node runs.
    pub inputs: Vec<String>,
    /// Keys passed through when present, without being required.
    pub optional_inputs: Vec<String>,
    /// Keys this node is allowed to write.
    pub outputs: Vec<String>,
    /// Retry the whole node on transient failure.
    pub retry: Option<RetryPolicy>,
    handler: Arc<dyn NodeHandler>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Node {
    /// Create a new node with minimal configuration.
    pub fn new(id: impl Into<String>, handler: Arc<dyn NodeHandler>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            inputs: vec![],
            optional_inputs: vec![],
            outputs: vec![],
            retry: None,
            handler,
        }
    }

    /// Set the human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the required input keys.
    pub fn with_inputs<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the optional input keys.
    pub fn with_optional_inputs<S: Into<String>>(
        mut self,
        keys: impl IntoIterator<Item = S>,
    ) -> Self {
        self.optional_inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Set the output keys.
    pub fn with_outputs<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.outputs = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Retry the node as a whole under `policy`.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Build this node's view of state, checking required inputs.
    pub fn prepare_input(&self, state: &WorkflowState) -> Result<WorkflowState> {
        if let Some(missing) = self.inputs.iter().find(|k| !state.contains(k)) {
            return Err(CaseGraphError::Validation {
                node: self.id.clone(),
                key: missing.clone(),
            });
        }
        let visible: Vec<String> = self
            .inputs
            .iter()
            .chain(self.optional_inputs.iter())
            .cloned()
            .collect();
        Ok(state.project(&visible))
    }

    /// Run the handler against a prepared input and check what it wrote.
    pub async fn invoke(&self, input: WorkflowState) -> Result<PartialUpdate> {
        let update = match &self.retry {
            Some(policy) => {
                retry(policy, &self.id, || self.handler.run(input.clone())).await?
            }
            None => self.handler.run(input).await?,
        };

        if let Some(key) = update.keys().find(|k| !self.outputs.contains(k)) {
            return Err(CaseGraphError::UndeclaredOutput {
                node: self.id.clone(),
                key: key.clone(),
            });
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn NodeHandler> {
        node_fn(|input: WorkflowState| async move {
            let text = input.require_str("echo", "text")?.to_uppercase();
            Ok(PartialUpdate::new().set("shout", json!(text)))
        })
    }

    #[test]
    fn test_node_builder() {
        let node = Node::new("n1", echo())
            .with_name("Echo")
            .with_inputs(["text"])
            .with_optional_inputs(["hint"])
            .with_outputs(["shout"]);

        assert_eq!(node.id, "n1");
        assert_eq!(node.name, "Echo");
        assert_eq!(node.inputs, vec!["text"]);
        assert_eq!(node.optional_inputs, vec!["hint"]);
        assert_eq!(node.outputs, vec!["shout"]);
        assert!(node.retry.is_none());
    }

    #[test]
    fn test_prepare_input_projects_declared_keys() {
        let node = Node::new("echo", echo())
            .with_inputs(["text"])
            .with_optional_inputs(["hint"]);
        let mut state = WorkflowState::new();
        state.set("text", json!("hi"));
        state.set("secret", json!("hidden"));

        let input = node.prepare_input(&state).unwrap();
        assert_eq!(input.get_str("text"), Some("hi"));
        assert!(input.get("secret").is_none());
        assert!(input.get("hint").is_none());
    }

    #[test]
    fn test_prepare_input_missing_required() {
        let node = Node::new("echo", echo()).with_inputs(["text"]);
        let err = node.prepare_input(&WorkflowState::new()).unwrap_err();
        assert!(matches!(err, CaseGraphError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_invoke_rejects_undeclared_output() {
        let node = Node::new("echo", echo())
            .with_inputs(["text"])
            .with_outputs(["other"]);
        let mut state = WorkflowState::new();
        state.set("text", json!("hi"));
        let input = node.prepare_input(&state).unwrap();

        let err = node.invoke(input).await.unwrap_err();
        assert!(matches!(
            err,
            CaseGraphError::UndeclaredOutput { ref key, .. } if key == "shout"
        ));
    }

    #[tokio::test]
    async fn test_invoke_returns_update() {
        let node = Node::new("echo", echo())
            .with_inputs(["text"])
            .with_outputs(["shout"]);
        let mut state = WorkflowState::new();
        state.set("text", json!("hi"));
        let input = node.prepare_input(&state).unwrap();

        let update = node.invoke(input).await.unwrap();
        assert_eq!(update.get("shout"), Some(&json!("HI")));
    }
}
