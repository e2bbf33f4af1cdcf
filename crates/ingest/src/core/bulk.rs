//! Chunked bulk writes with per-item outcome folding.
//!
//! Operations are split into chunks of a caller-supplied size and sent one
//! chunk at a time, so at most one bulk request per call is in flight. Each
//! chunk's response is folded into a [`BulkWriteReport`]:
//!
//! - written items are counted
//! - create conflicts are counted and otherwise ignored
//! - any other item failure is recorded as an [`ItemError`]
//!
//! A chunk whose request fails as a whole marks all of its items as failed
//! and the next chunk is still attempted.

use serde::Serialize;
use tracing::{debug, warn};

use super::store::{Collection, DocumentStore, ItemOutcome, WriteOp};

/// A per-item store failure, keyed by document id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemError {
    /// Document id, or a positional label when the store assigned none.
    pub id: String,
    /// Why the item was not written.
    pub reason: String,
}

/// Aggregate outcome of a chunked bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkWriteReport {
    /// Operations handed to the writer.
    pub attempted: usize,
    /// Items the store confirmed as written.
    pub written: usize,
    /// Create-if-absent items that already existed.
    pub conflicts: usize,
    /// Bulk requests issued.
    pub chunks: usize,
    /// Bulk requests that failed as a whole.
    pub failed_chunks: usize,
    /// Items that failed for reasons other than a conflict.
    pub errors: Vec<ItemError>,
}

impl BulkWriteReport {
    /// Returns true if every item was written or conflicted.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Writes `operations` to `collection` in sequential chunks of `chunk_size`.
///
/// A `chunk_size` of zero is treated as one.
pub async fn write_chunked(
    store: &dyn DocumentStore,
    collection: Collection,
    operations: Vec<WriteOp>,
    chunk_size: usize,
) -> BulkWriteReport {
    let chunk_size = chunk_size.max(1);
    let mut report = BulkWriteReport {
        attempted: operations.len(),
        ..Default::default()
    };

    let mut remaining = operations.into_iter().peekable();
    let mut offset = 0usize;

    while remaining.peek().is_some() {
        let chunk: Vec<WriteOp> = remaining.by_ref().take(chunk_size).collect();
        let labels: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(i, op)| item_label(collection, op, offset + i))
            .collect();
        let chunk_len = chunk.len();
        report.chunks += 1;

        match store.bulk_write(collection, chunk).await {
            Ok(results) => {
                if results.len() != chunk_len {
                    warn!(
                        collection = %collection,
                        expected = chunk_len,
                        received = results.len(),
                        "Bulk response item count mismatch"
                    );
                }
                for (i, label) in labels.iter().enumerate() {
                    let Some(item) = results.get(i) else {
                        report.errors.push(ItemError {
                            id: label.clone(),
                            reason: "no result reported for item".to_string(),
                        });
                        continue;
                    };
                    let id = item.id.clone().unwrap_or_else(|| label.clone());
                    match &item.outcome {
                        ItemOutcome::Written => report.written += 1,
                        ItemOutcome::Conflict => {
                            debug!(collection = %collection, id = %id, "Document already exists");
                            report.conflicts += 1;
                        }
                        ItemOutcome::Failed { reason } => {
                            warn!(
                                collection = %collection,
                                id = %id,
                                reason = %reason,
                                "Bulk item failed"
                            );
                            report.errors.push(ItemError {
                                id,
                                reason: reason.clone(),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                warn!(
                    collection = %collection,
                    chunk = report.chunks,
                    items = chunk_len,
                    error = %e,
                    "Bulk request failed"
                );
                report.failed_chunks += 1;
                let reason = e.to_string();
                report
                    .errors
                    .extend(labels.into_iter().map(|id| ItemError {
                        id,
                        reason: reason.clone(),
                    }));
            }
        }

        offset += chunk_len;
    }

    report
}

/// The caller key when there is one, otherwise `<collection>#<position>`.
fn item_label(collection: Collection, op: &WriteOp, position: usize) -> String {
    match op.id() {
        Some(id) => id.to_string(),
        None => format!("{}#{}", collection, position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{BulkItemResult, CreateOutcome};
    use crate::error::{BackendError, BackendResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{Value, json};

    /// Fails whole requests whose first item matches, and single items by id.
    #[derive(Default)]
    struct ScriptedStore {
        calls: Mutex<Vec<usize>>,
        fail_request_containing: Option<String>,
        fail_item: Option<String>,
        conflict_item: Option<String>,
    }

    #[async_trait]
    impl DocumentStore for ScriptedStore {
        fn backend_name(&self) -> &'static str {
            "scripted"
        }

        async fn create_if_absent(
            &self,
            _collection: Collection,
            _id: &str,
            _document: Value,
        ) -> BackendResult<CreateOutcome> {
            Ok(CreateOutcome::Created)
        }

        async fn insert(&self, _collection: Collection, _document: Value) -> BackendResult<String> {
            Ok("generated".to_string())
        }

        async fn bulk_write(
            &self,
            _collection: Collection,
            operations: Vec<WriteOp>,
        ) -> BackendResult<Vec<BulkItemResult>> {
            self.calls.lock().push(operations.len());
            if let Some(bad) = &self.fail_request_containing
                && operations.iter().any(|op| op.id() == Some(bad.as_str()))
            {
                return Err(BackendError::Unavailable {
                    backend_name: "scripted".to_string(),
                    message: "down".to_string(),
                });
            }
            Ok(operations
                .iter()
                .map(|op| {
                    let id = op.id().unwrap_or("generated").to_string();
                    if self.fail_item.as_deref() == Some(id.as_str()) {
                        BulkItemResult::failed(Some(id), "mapper_parsing_exception")
                    } else if self.conflict_item.as_deref() == Some(id.as_str()) {
                        BulkItemResult::conflict(id)
                    } else {
                        BulkItemResult::written(id)
                    }
                })
                .collect())
        }

        async fn health_check(&self) -> BackendResult<()> {
            Ok(())
        }
    }

    fn ops(n: usize) -> Vec<WriteOp> {
        (0..n)
            .map(|i| WriteOp::create_if_absent(format!("q{}", i), json!({"i": i})))
            .collect()
    }

    #[tokio::test]
    async fn test_chunks_are_sized() {
        let store = ScriptedStore::default();
        let report = write_chunked(&store, Collection::Queries, ops(45), 20).await;
        assert_eq!(*store.calls.lock(), vec![20, 20, 5]);
        assert_eq!(report.chunks, 3);
        assert_eq!(report.attempted, 45);
        assert_eq!(report.written, 45);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_empty_input_issues_no_requests() {
        let store = ScriptedStore::default();
        let report = write_chunked(&store, Collection::Events, Vec::new(), 20).await;
        assert!(store.calls.lock().is_empty());
        assert_eq!(report, BulkWriteReport::default());
    }

    #[tokio::test]
    async fn test_conflicts_are_swallowed_and_item_errors_collected() {
        let store = ScriptedStore {
            conflict_item: Some("q1".to_string()),
            fail_item: Some("q3".to_string()),
            ..Default::default()
        };
        let report = write_chunked(&store, Collection::Queries, ops(5), 2).await;
        assert_eq!(report.written, 3);
        assert_eq!(report.conflicts, 1);
        assert_eq!(
            report.errors,
            vec![ItemError {
                id: "q3".to_string(),
                reason: "mapper_parsing_exception".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_stop_later_chunks() {
        let store = ScriptedStore {
            fail_request_containing: Some("q0".to_string()),
            ..Default::default()
        };
        let report = write_chunked(&store, Collection::Queries, ops(5), 2).await;
        assert_eq!(*store.calls.lock(), vec![2, 2, 1]);
        assert_eq!(report.failed_chunks, 1);
        assert_eq!(report.written, 3);
        let failed: Vec<&str> = report.errors.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(failed, vec!["q0", "q1"]);
    }

    #[tokio::test]
    async fn test_zero_chunk_size_is_clamped() {
        let store = ScriptedStore::default();
        let report = write_chunked(&store, Collection::Queries, ops(2), 0).await;
        assert_eq!(*store.calls.lock(), vec![1, 1]);
        assert_eq!(report.written, 2);
    }

    #[test]
    fn test_item_label_for_inserts() {
        let op = WriteOp::insert(json!({}));
        assert_eq!(item_label(Collection::Events, &op, 7), "events#7");
    }
}
