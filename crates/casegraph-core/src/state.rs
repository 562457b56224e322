use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{CaseGraphError, Result};

/// Shared state threaded through a workflow run.
///
/// Keys are strings; values are JSON. The only way state changes is by
/// merging a node's [`PartialUpdate`] into it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    data: HashMap<String, serde_json::Value>,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state pre-seeded with initial input.
    pub fn from_map(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// The value at `key` when it holds a JSON string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Deserialize a value into a typed form.
    ///
    /// Missing keys and JSON nulls both yield `Ok(None)`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.data.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
        }
    }

    /// Deserialize a required value, failing with `Validation` when absent.
    pub fn require<T: DeserializeOwned>(&self, node: &str, key: &str) -> Result<T> {
        self.get_as(key)?.ok_or_else(|| CaseGraphError::Validation {
            node: node.to_string(),
            key: key.to_string(),
        })
    }

    /// Required non-empty string, failing with `Validation` when absent or blank.
    pub fn require_str(&self, node: &str, key: &str) -> Result<&str> {
        self.get_str(key)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CaseGraphError::Validation {
                node: node.to_string(),
                key: key.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    /// Set a value directly. Used for seeding initial input.
    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.data.insert(key.into(), value);
    }

    /// Remove a key, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Shallow merge: every key in `update` overwrites the same key here.
    /// Keys absent from the update are untouched.
    pub fn merge(&mut self, update: PartialUpdate) {
        for (k, v) in update.data {
            self.data.insert(k, v);
        }
    }

    /// Consuming form of [`merge`](Self::merge).
    pub fn merged(mut self, update: PartialUpdate) -> Self {
        self.merge(update);
        self
    }

    /// A copy holding only the given keys (those present).
    pub fn project(&self, keys: &[String]) -> Self {
        let data = keys
            .iter()
            .filter_map(|k| self.data.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        Self { data }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Every key written so far.
    pub fn data(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }

    pub fn into_map(self) -> HashMap<String, serde_json::Value> {
        self.data
    }
}

/// The subset of state fields a node contributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartialUpdate {
    data: HashMap<String, serde_json::Value>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw JSON value.
    pub fn set(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Add any serializable value.
    pub fn with<T: Serialize>(self, key: impl Into<String>, value: &T) -> Result<Self> {
        Ok(self.set(key, serde_json::to_value(value)?))
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for PartialUpdate {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_last_writer_wins() {
        let state = WorkflowState::new()
            .merged(PartialUpdate::new().set("a", json!(1)))
            .merged(PartialUpdate::new().set("b", json!(2)))
            .merged(PartialUpdate::new().set("a", json!(3)));

        assert_eq!(state.len(), 2);
        assert_eq!(state.get("a"), Some(&json!(3)));
        assert_eq!(state.get("b"), Some(&json!(2)));
    }

    #[test]
    fn test_merge_leaves_absent_keys() {
        let mut state = WorkflowState::new();
        state.set("keep", json!("x"));
        state.merge(PartialUpdate::new().set("other", json!(true)));
        assert_eq!(state.get_str("keep"), Some("x"));
    }

    #[test]
    fn test_require_missing_is_validation() {
        let state = WorkflowState::new();
        let err = state.require::<String>("translate", "document_text").unwrap_err();
        assert!(matches!(
            err,
            CaseGraphError::Validation { ref node, ref key } if node == "translate" && key == "document_text"
        ));
    }

    #[test]
    fn test_require_str_rejects_blank() {
        let mut state = WorkflowState::new();
        state.set("text", json!("   "));
        assert!(state.require_str("n", "text").is_err());
        state.set("text", json!("content"));
        assert_eq!(state.require_str("n", "text").unwrap(), "content");
    }

    #[test]
    fn test_null_counts_as_absent() {
        let mut state = WorkflowState::new();
        state.set("facts", serde_json::Value::Null);
        assert!(!state.contains("facts"));
        assert_eq!(state.get_as::<Vec<String>>("facts").unwrap(), None);
    }

    #[test]
    fn test_project() {
        let mut state = WorkflowState::new();
        state.set("a", json!(1));
        state.set("b", json!(2));
        let view = state.project(&["a".into(), "missing".into()]);
        assert_eq!(view.len(), 1);
        assert_eq!(view.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_update_with_serializable() {
        let update = PartialUpdate::new()
            .with("steps", &vec!["seal the sample".to_string()])
            .unwrap();
        assert_eq!(update.get("steps"), Some(&json!(["seal the sample"])));
    }
}
