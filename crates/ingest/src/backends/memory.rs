//! In-memory registry and store.
//!
//! Both backends live entirely in process and are meant for development and
//! tests. Registry expiry uses [`tokio::time::Instant`], so tests running with
//! a paused clock can advance time past a TTL.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::{
    BulkItemResult, Collection, CreateOutcome, DocumentStore, ItemOutcome, SessionRegistry,
    WriteOp, session_key, wallet_key,
};
use crate::error::BackendResult;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// A key-value session registry with per-key TTL held in process memory.
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (sessions and wallets).
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_live(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }

    /// Number of stored keys, expired ones included.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.entries.read().len()
    }

    // expired keys are dropped on every write
    fn put(&self, key: String, value: String, ttl: Duration) {
        let now = Instant::now();
        let mut entries = self.entries.write();
        entries.retain(|_, e| e.is_live(now));
        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, session_id: &str) -> BackendResult<bool> {
        Ok(self.get_live(&session_key(session_id)).is_some())
    }

    async fn get_wallet(&self, session_id: &str) -> BackendResult<Option<String>> {
        Ok(self.get_live(&wallet_key(session_id)))
    }

    async fn set_wallet(
        &self,
        session_id: &str,
        address: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.put(wallet_key(session_id), address.to_string(), ttl);
        Ok(())
    }

    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()> {
        self.put(session_key(session_id), "1".to_string(), ttl);
        Ok(())
    }

    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(&session_key(session_id)) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, session_id: &str) -> BackendResult<()> {
        let mut entries = self.entries.write();
        entries.remove(&session_key(session_id));
        entries.remove(&wallet_key(session_id));
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// A document store held in process memory.
///
/// Every bulk request is recorded so tests can assert how writes were chunked.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<Collection, BTreeMap<String, Value>>>,
    bulk_calls: RwLock<Vec<(Collection, usize)>>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All documents in a collection, keyed by id.
    pub fn documents(&self, collection: Collection) -> BTreeMap<String, Value> {
        self.collections
            .read()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        self.collections
            .read()
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// The document stored under `id`, if any.
    pub fn get(&self, collection: Collection, id: &str) -> Option<Value> {
        self.collections
            .read()
            .get(&collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Every bulk request received, as `(collection, item count)` in arrival order.
    pub fn bulk_calls(&self) -> Vec<(Collection, usize)> {
        self.bulk_calls.read().clone()
    }

    fn apply(&self, collection: Collection, op: WriteOp) -> BulkItemResult {
        let mut collections = self.collections.write();
        let docs = collections.entry(collection).or_default();
        match op {
            WriteOp::CreateIfAbsent { id, document } => {
                if docs.contains_key(&id) {
                    BulkItemResult::conflict(id)
                } else {
                    docs.insert(id.clone(), document);
                    BulkItemResult::written(id)
                }
            }
            WriteOp::Insert { document } => {
                let id = Uuid::new_v4().to_string();
                docs.insert(id.clone(), document);
                BulkItemResult::written(id)
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_if_absent(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> BackendResult<CreateOutcome> {
        let result = self.apply(collection, WriteOp::create_if_absent(id, document));
        Ok(match result.outcome {
            ItemOutcome::Conflict => CreateOutcome::Conflict,
            _ => CreateOutcome::Created,
        })
    }

    async fn insert(&self, collection: Collection, document: Value) -> BackendResult<String> {
        let result = self.apply(collection, WriteOp::insert(document));
        Ok(result.id.unwrap_or_default())
    }

    async fn bulk_write(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
    ) -> BackendResult<Vec<BulkItemResult>> {
        self.bulk_calls.write().push((collection, operations.len()));
        Ok(operations
            .into_iter()
            .map(|op| self.apply(collection, op))
            .collect())
    }

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}
