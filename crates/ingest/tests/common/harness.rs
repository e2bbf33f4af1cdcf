//! Pipeline harness and failure-injecting collaborators.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Notify, Semaphore};

use sonar_ingest::backends::memory::{InMemoryDocumentStore, InMemorySessionRegistry};
use sonar_ingest::core::{BulkItemResult, Collection, CreateOutcome, WriteOp};
use sonar_ingest::error::{BackendError, BackendResult};
use sonar_ingest::{BatchProcessor, DocumentStore, IngestConfig, IngestService, SessionRegistry};

use super::fixtures::LIVE_SESSION;

/// Default TTL for sessions created by the harness.
pub const SESSION_TTL: Duration = Duration::from_secs(3600);

/// In-memory backends plus configuration.
pub struct Harness {
    pub config: Arc<IngestConfig>,
    pub registry: Arc<InMemorySessionRegistry>,
    pub store: Arc<InMemoryDocumentStore>,
}

impl Harness {
    /// Creates a harness with [`LIVE_SESSION`] registered.
    pub async fn new() -> Self {
        Self::with_config(IngestConfig::for_testing()).await
    }

    /// Creates a harness with a custom configuration and [`LIVE_SESSION`] registered.
    pub async fn with_config(config: IngestConfig) -> Self {
        let registry = Arc::new(InMemorySessionRegistry::new());
        registry
            .create(LIVE_SESSION, SESSION_TTL)
            .await
            .expect("create session");
        Self {
            config: Arc::new(config),
            registry,
            store: Arc::new(InMemoryDocumentStore::new()),
        }
    }

    /// Associates a wallet with a registered session.
    pub async fn with_wallet(self, session_id: &str, address: &str) -> Self {
        self.registry
            .set_wallet(session_id, address, SESSION_TTL)
            .await
            .expect("set wallet");
        self
    }

    /// A processor over the harness backends.
    pub fn processor(&self) -> BatchProcessor {
        BatchProcessor::new(
            self.config.clone(),
            self.registry.clone(),
            self.store.clone(),
        )
    }

    /// A started service over the harness backends.
    pub fn service(&self) -> IngestService {
        IngestService::start(
            self.config.clone(),
            self.registry.clone(),
            self.store.clone(),
        )
    }
}

fn unavailable(backend_name: &str) -> BackendError {
    BackendError::Unavailable {
        backend_name: backend_name.to_string(),
        message: "injected failure".to_string(),
    }
}

/// A registry that cannot be reached.
#[derive(Debug, Default)]
pub struct UnreachableRegistry;

#[async_trait]
impl SessionRegistry for UnreachableRegistry {
    fn backend_name(&self) -> &'static str {
        "unreachable"
    }

    async fn exists(&self, _session_id: &str) -> BackendResult<bool> {
        Err(unavailable("unreachable"))
    }

    async fn get_wallet(&self, _session_id: &str) -> BackendResult<Option<String>> {
        Err(unavailable("unreachable"))
    }

    async fn set_wallet(
        &self,
        _session_id: &str,
        _address: &str,
        _ttl: Duration,
    ) -> BackendResult<()> {
        Err(unavailable("unreachable"))
    }

    async fn create(&self, _session_id: &str, _ttl: Duration) -> BackendResult<()> {
        Err(unavailable("unreachable"))
    }

    async fn refresh(&self, _session_id: &str, _ttl: Duration) -> BackendResult<bool> {
        Err(unavailable("unreachable"))
    }

    async fn delete(&self, _session_id: &str) -> BackendResult<()> {
        Err(unavailable("unreachable"))
    }

    async fn ping(&self) -> bool {
        false
    }
}

/// Wraps a registry and counts existence checks.
pub struct CountingRegistry {
    inner: Arc<dyn SessionRegistry>,
    exists_calls: AtomicUsize,
}

impl CountingRegistry {
    pub fn new(inner: Arc<dyn SessionRegistry>) -> Self {
        Self {
            inner,
            exists_calls: AtomicUsize::new(0),
        }
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionRegistry for CountingRegistry {
    fn backend_name(&self) -> &'static str {
        "counting"
    }

    async fn exists(&self, session_id: &str) -> BackendResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.exists(session_id).await
    }

    async fn get_wallet(&self, session_id: &str) -> BackendResult<Option<String>> {
        self.inner.get_wallet(session_id).await
    }

    async fn set_wallet(
        &self,
        session_id: &str,
        address: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.inner.set_wallet(session_id, address, ttl).await
    }

    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()> {
        self.inner.create(session_id, ttl).await
    }

    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool> {
        self.inner.refresh(session_id, ttl).await
    }

    async fn delete(&self, session_id: &str) -> BackendResult<()> {
        self.inner.delete(session_id).await
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }
}

/// A registry whose wallet lookups fail while existence checks succeed.
pub struct WalletOutageRegistry {
    inner: Arc<InMemorySessionRegistry>,
}

impl WalletOutageRegistry {
    pub fn new(inner: Arc<InMemorySessionRegistry>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SessionRegistry for WalletOutageRegistry {
    fn backend_name(&self) -> &'static str {
        "wallet-outage"
    }

    async fn exists(&self, session_id: &str) -> BackendResult<bool> {
        self.inner.exists(session_id).await
    }

    async fn get_wallet(&self, _session_id: &str) -> BackendResult<Option<String>> {
        Err(BackendError::Timeout {
            backend_name: "wallet-outage".to_string(),
            operation: "GET".to_string(),
            timeout_ms: 5,
        })
    }

    async fn set_wallet(
        &self,
        session_id: &str,
        address: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.inner.set_wallet(session_id, address, ttl).await
    }

    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()> {
        self.inner.create(session_id, ttl).await
    }

    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool> {
        self.inner.refresh(session_id, ttl).await
    }

    async fn delete(&self, session_id: &str) -> BackendResult<()> {
        self.inner.delete(session_id).await
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// A registry whose existence checks for one session wait until the test
/// releases them.
pub struct StalledRegistry {
    inner: Arc<InMemorySessionRegistry>,
    stalled_session: String,
    release: Semaphore,
}

impl StalledRegistry {
    pub fn new(inner: Arc<InMemorySessionRegistry>, stalled_session: &str) -> Self {
        Self {
            inner,
            stalled_session: stalled_session.to_string(),
            release: Semaphore::new(0),
        }
    }

    /// Lets every current and future check for the stalled session through.
    pub fn release(&self) {
        self.release.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl SessionRegistry for StalledRegistry {
    fn backend_name(&self) -> &'static str {
        "stalled"
    }

    async fn exists(&self, session_id: &str) -> BackendResult<bool> {
        if session_id == self.stalled_session {
            let _permit = self
                .release
                .acquire()
                .await
                .map_err(|e| BackendError::internal("stalled", e.to_string()))?;
        }
        self.inner.exists(session_id).await
    }

    async fn get_wallet(&self, session_id: &str) -> BackendResult<Option<String>> {
        self.inner.get_wallet(session_id).await
    }

    async fn set_wallet(
        &self,
        session_id: &str,
        address: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.inner.set_wallet(session_id, address, ttl).await
    }

    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()> {
        self.inner.create(session_id, ttl).await
    }

    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool> {
        self.inner.refresh(session_id, ttl).await
    }

    async fn delete(&self, session_id: &str) -> BackendResult<()> {
        self.inner.delete(session_id).await
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// A store that fails selected items, or whole requests for one collection.
pub struct FaultyStore {
    pub inner: Arc<InMemoryDocumentStore>,
    failing_ids: HashSet<String>,
    failing_collection: Option<Collection>,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            failing_ids: HashSet::new(),
            failing_collection: None,
        }
    }

    /// Items with this id are reported as failed and not written.
    pub fn fail_item(mut self, id: &str) -> Self {
        self.failing_ids.insert(id.to_string());
        self
    }

    /// Every bulk request against this collection fails.
    pub fn fail_collection(mut self, collection: Collection) -> Self {
        self.failing_collection = Some(collection);
        self
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    fn backend_name(&self) -> &'static str {
        "faulty"
    }

    async fn create_if_absent(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> BackendResult<CreateOutcome> {
        self.inner.create_if_absent(collection, id, document).await
    }

    async fn insert(&self, collection: Collection, document: Value) -> BackendResult<String> {
        self.inner.insert(collection, document).await
    }

    async fn bulk_write(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
    ) -> BackendResult<Vec<BulkItemResult>> {
        if self.failing_collection == Some(collection) {
            return Err(unavailable("faulty"));
        }

        // results are positional, so failed items keep their slot
        let mut slots = Vec::with_capacity(operations.len());
        let mut passing = Vec::new();
        for op in operations {
            match op.id().filter(|id| self.failing_ids.contains(*id)) {
                Some(id) => slots.push(Some(BulkItemResult::failed(
                    Some(id.to_string()),
                    "mapper_parsing_exception: injected",
                ))),
                None => {
                    slots.push(None);
                    passing.push(op);
                }
            }
        }

        let mut written = self
            .inner
            .bulk_write(collection, passing)
            .await?
            .into_iter();
        Ok(slots
            .into_iter()
            .filter_map(|slot| slot.or_else(|| written.next()))
            .collect())
    }

    async fn health_check(&self) -> BackendResult<()> {
        Err(unavailable("faulty"))
    }
}

/// A store whose bulk writes wait until the test opens the gate.
pub struct GatedStore {
    pub inner: Arc<InMemoryDocumentStore>,
    gate: Semaphore,
    entered: Notify,
}

impl GatedStore {
    pub fn new(inner: Arc<InMemoryDocumentStore>) -> Self {
        Self {
            inner,
            gate: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    /// Waits until some bulk write is blocked at the gate.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    /// Lets every current and future bulk write through.
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl DocumentStore for GatedStore {
    fn backend_name(&self) -> &'static str {
        "gated"
    }

    async fn create_if_absent(
        &self,
        collection: Collection,
        id: &str,
        document: Value,
    ) -> BackendResult<CreateOutcome> {
        self.inner.create_if_absent(collection, id, document).await
    }

    async fn insert(&self, collection: Collection, document: Value) -> BackendResult<String> {
        self.inner.insert(collection, document).await
    }

    async fn bulk_write(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
    ) -> BackendResult<Vec<BulkItemResult>> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| BackendError::internal("gated", e.to_string()))?;
        self.inner.bulk_write(collection, operations).await
    }

    async fn health_check(&self) -> BackendResult<()> {
        Ok(())
    }
}
