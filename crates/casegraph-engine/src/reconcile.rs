use std::collections::HashMap;

use futures::future::BoxFuture;
use tracing::{debug, info};

use casegraph_core::config::RetryPolicy;
use casegraph_core::error::{CaseGraphError, Result};
use casegraph_core::types::DedupRecord;

use crate::retry::retry;

/// Collapses a group of records sharing one dedup key into a single record.
pub trait RecordMerger<R>: Send + Sync {
    fn merge<'a>(&'a self, key: &'a str, duplicates: &'a [R]) -> BoxFuture<'a, Result<R>>;
}

/// Group records by dedup key and merge every group holding more than one.
///
/// Output holds one record per distinct key, in the order each key first
/// appeared. Singletons pass through untouched and never reach the merger.
/// A merge that keeps failing, or keeps returning a record under a different
/// key, fails the whole call with `Merge`.
pub async fn reconcile<R: DedupRecord>(
    records: Vec<R>,
    merger: &dyn RecordMerger<R>,
    policy: &RetryPolicy,
) -> Result<Vec<R>> {
    let total = records.len();
    let mut groups: Vec<(String, Vec<R>)> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = record.dedup_key().to_string();
        match slot.get(&key) {
            Some(&i) => groups[i].1.push(record),
            None => {
                slot.insert(key.clone(), groups.len());
                groups.push((key, vec![record]));
            }
        }
    }

    let mut merged_groups = 0usize;
    let mut out = Vec::with_capacity(groups.len());
    for (key, mut group) in groups {
        if group.len() == 1 {
            out.extend(group.pop());
            continue;
        }

        debug!(key = %key, duplicates = group.len(), "Merging duplicate records");
        let (wanted, duplicates) = (key.as_str(), group.as_slice());
        let merged = retry(policy, "merge_duplicates", || async move {
            let merged = merger.merge(wanted, duplicates).await?;
            if merged.dedup_key() != wanted {
                return Err(CaseGraphError::invalid_response(
                    "merger",
                    format!(
                        "merged record has key '{}', expected '{}'",
                        merged.dedup_key(),
                        wanted
                    ),
                ));
            }
            Ok(merged)
        })
        .await
        .map_err(|e| CaseGraphError::Merge {
            key: key.clone(),
            source: Box::new(e),
        })?;

        merged_groups += 1;
        out.push(merged);
    }

    info!(
        input = total,
        output = out.len(),
        merged_groups,
        "Reconciled duplicate records"
    );
    Ok(out)
}
