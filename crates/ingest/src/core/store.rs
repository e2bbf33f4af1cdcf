//! Document store trait and bulk write types.
//!
//! The store is the persistence boundary of the pipeline. Queries are written
//! with create-if-absent semantics keyed by their `query_id`, so resubmitting a
//! query is a benign conflict. Events have no natural key and are inserted,
//! so identical events are stored as separate documents.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendResult;

/// A logical collection in the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    /// Validated query records.
    Queries,
    /// Validated event records.
    Events,
}

impl Collection {
    /// The collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Queries => "queries",
            Collection::Events => "events",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single create-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The document was written.
    Created,
    /// A document with the same id already existed; nothing was written.
    Conflict,
}

/// A single operation within a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Write the document only if no document with `id` exists.
    CreateIfAbsent {
        /// Document key.
        id: String,
        /// Document body.
        document: Value,
    },
    /// Write the document under a store-generated id.
    Insert {
        /// Document body.
        document: Value,
    },
}

impl WriteOp {
    /// Creates a create-if-absent operation.
    pub fn create_if_absent(id: impl Into<String>, document: Value) -> Self {
        WriteOp::CreateIfAbsent {
            id: id.into(),
            document,
        }
    }

    /// Creates an insert operation.
    pub fn insert(document: Value) -> Self {
        WriteOp::Insert { document }
    }

    /// The caller-supplied key, if this operation has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            WriteOp::CreateIfAbsent { id, .. } => Some(id.as_str()),
            WriteOp::Insert { .. } => None,
        }
    }

    /// The document body.
    pub fn document(&self) -> &Value {
        match self {
            WriteOp::CreateIfAbsent { document, .. } | WriteOp::Insert { document } => document,
        }
    }
}

/// Outcome of one item in a bulk response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The document was written.
    Written,
    /// Create-if-absent found an existing document.
    Conflict,
    /// The item failed for another reason.
    Failed {
        /// Store-reported reason.
        reason: String,
    },
}

/// Per-item result of a bulk request, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    /// Document id as reported by the store (or the requested key).
    pub id: Option<String>,
    /// What happened to the item.
    pub outcome: ItemOutcome,
}

impl BulkItemResult {
    /// A written item.
    pub fn written(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            outcome: ItemOutcome::Written,
        }
    }

    /// A conflicting create.
    pub fn conflict(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            outcome: ItemOutcome::Conflict,
        }
    }

    /// A failed item.
    pub fn failed(id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            id,
            outcome: ItemOutcome::Failed {
                reason: reason.into(),
            },
        }
    }
}

/// Write operations against the document store.
///
/// A bulk request succeeds at the transport level even when individual items
/// fail; per-item outcomes are reported in the returned vector, one entry per
/// operation in request order. An `Err` means the request as a whole failed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns a human-readable name for this store backend.
    fn backend_name(&self) -> &'static str;

    /// Writes `document` under `id` unless a document with that id exists.
    async fn create_if_absent(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> BackendResult<CreateOutcome>;

    /// Writes `document` under a store-generated id, which is returned.
    async fn insert(&self, collection: Collection, document: Value) -> BackendResult<String>;

    /// Executes a bulk request against one collection.
    async fn bulk_write(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
    ) -> BackendResult<Vec<BulkItemResult>>;

    /// Checks that the store is reachable and healthy.
    async fn health_check(&self) -> BackendResult<()>;
}
