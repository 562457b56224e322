use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use casegraph_core::error::Result;
use casegraph_core::traits::ResultStore;
use casegraph_core::types::{RunId, StoredResult};

/// Results kept for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<RunId, StoredResult>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }
}

impl ResultStore for InMemoryResultStore {
    fn put(&self, result: StoredResult) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.results.write().await.insert(result.run_id.clone(), result);
            Ok(())
        })
    }

    fn get(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<StoredResult>>> {
        let run_id = run_id.clone();
        Box::pin(async move { Ok(self.results.read().await.get(&run_id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_overwrite() {
        let store = InMemoryResultStore::new();
        let id = RunId::from_string("run-1");
        assert!(store.get(&id).await.unwrap().is_none());

        for n in 0..2 {
            store
                .put(StoredResult {
                    run_id: id.clone(),
                    stored_at: chrono::Utc::now(),
                    state: serde_json::json!({ "n": n }),
                })
                .await
                .unwrap();
        }
        let got = store.get(&id).await.unwrap().unwrap();
        assert_eq!(got.state["n"], 1);
        assert_eq!(store.len().await, 1);
    }
}
