//! DocumentStore implementation for Elasticsearch.

use async_trait::async_trait;
use elasticsearch::{BulkOperation, BulkParts, CreateParts, IndexParts};
use serde_json::Value;
use tracing::debug;

use crate::core::{BulkItemResult, Collection, CreateOutcome, DocumentStore, ItemOutcome, WriteOp};
use crate::error::{BackendError, BackendResult};

use super::backend::{BACKEND_NAME, ElasticsearchStore};

const STATUS_CONFLICT: u16 = 409;

fn request_error(
    store: &ElasticsearchStore,
    operation: &str,
    err: elasticsearch::Error,
) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            backend_name: BACKEND_NAME.to_string(),
            operation: operation.to_string(),
            timeout_ms: store.config().request_timeout_ms,
        }
    } else {
        BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("{} request failed: {}", operation, err),
        }
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create_if_absent(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> BackendResult<CreateOutcome> {
        let index = self.index_name(collection);

        let response = self
            .client()
            .create(CreateParts::IndexId(&index, id))
            .body(document)
            .send()
            .await
            .map_err(|e| request_error(self, "create", e))?;

        let status = response.status_code();
        if status.as_u16() == STATUS_CONFLICT {
            debug!(index = %index, id = %id, "Document already exists");
            return Ok(CreateOutcome::Conflict);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::QueryError {
                message: format!("Failed to create document (status {}): {}", status, body),
            });
        }

        Ok(CreateOutcome::Created)
    }

    async fn insert(&self, collection: Collection, document: Value) -> BackendResult<String> {
        let index = self.index_name(collection);

        let response = self
            .client()
            .index(IndexParts::Index(&index))
            .body(document)
            .send()
            .await
            .map_err(|e| request_error(self, "index", e))?;

        let status = response.status_code();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::QueryError {
                message: format!("Failed to index document (status {}): {}", status, body),
            });
        }

        let body = response.json::<Value>().await?;
        body.get("_id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| BackendError::SerializationError {
                message: "index response carries no _id".to_string(),
            })
    }

    async fn bulk_write(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
    ) -> BackendResult<Vec<BulkItemResult>> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.index_name(collection);
        let requested = operations.len();
        let body = bulk_operations(operations);

        let response = self
            .client()
            .bulk(BulkParts::Index(&index))
            .body(body)
            .send()
            .await
            .map_err(|e| request_error(self, "bulk", e))?;

        let status = response.status_code();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::QueryError {
                message: format!("Bulk request failed (status {}): {}", status, text),
            });
        }

        let body = response.json::<Value>().await?;
        let results = parse_bulk_response(&body)?;
        if results.len() != requested {
            debug!(
                index = %index,
                requested,
                received = results.len(),
                "Bulk response item count differs from request"
            );
        }
        Ok(results)
    }

    async fn health_check(&self) -> BackendResult<()> {
        self.cluster_health().await
    }
}

/// Builds the `_bulk` body for a chunk.
///
/// Create-if-absent becomes a `create` action keyed by the caller's id; inserts
/// become `index` actions without an id so the store assigns one.
pub fn bulk_operations(operations: Vec<WriteOp>) -> Vec<BulkOperation<Value>> {
    operations
        .into_iter()
        .map(|op| -> BulkOperation<Value> {
            match op {
                WriteOp::CreateIfAbsent { id, document } => {
                    BulkOperation::create(document).id(id).into()
                }
                WriteOp::Insert { document } => BulkOperation::index(document).into(),
            }
        })
        .collect()
}

/// Maps a `_bulk` response body to per-item results, in request order.
///
/// A `create` item that failed with status 409 is a conflict. Any other
/// non-2xx item is a failure carrying the store's error type and reason.
pub fn parse_bulk_response(body: &Value) -> BackendResult<Vec<BulkItemResult>> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::SerializationError {
            message: "bulk response carries no items".to_string(),
        })?;

    Ok(items.iter().map(parse_bulk_item).collect())
}

fn parse_bulk_item(item: &Value) -> BulkItemResult {
    let Some((action, result)) = item.as_object().and_then(|obj| obj.iter().next()) else {
        return BulkItemResult::failed(None, "malformed bulk item");
    };

    let id = result
        .get("_id")
        .and_then(Value::as_str)
        .map(str::to_string);
    let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);

    if (200..300).contains(&status) {
        return BulkItemResult {
            id,
            outcome: ItemOutcome::Written,
        };
    }

    if action == "create" && status == u64::from(STATUS_CONFLICT) {
        return BulkItemResult {
            id,
            outcome: ItemOutcome::Conflict,
        };
    }

    let reason = match result.get("error") {
        Some(error) => {
            let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
            match error.get("reason").and_then(Value::as_str) {
                Some(reason) => format!("{}: {}", kind, reason),
                None => kind.to_string(),
            }
        }
        None => format!("status {}", status),
    };
    BulkItemResult::failed(id, reason)
}
