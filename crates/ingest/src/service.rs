//! Ingestion entry point.
//!
//! [`IngestService`] ties the pipeline together. [`IngestService::ingest`]
//! performs every check the submitter waits for (structural limits, then the
//! session preflight) and hands the batch to the background dispatcher.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sonar_ingest::backends::memory::{InMemoryDocumentStore, InMemorySessionRegistry};
//! use sonar_ingest::{BatchSubmission, IngestConfig, IngestService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = IngestService::start(
//!     Arc::new(IngestConfig::for_testing()),
//!     Arc::new(InMemorySessionRegistry::new()),
//!     Arc::new(InMemoryDocumentStore::new()),
//! );
//!
//! let accepted = service.ingest(BatchSubmission::default()).await?;
//! assert_eq!(accepted.queries, 0);
//!
//! let stats = service.shutdown().await;
//! println!("{} batches processed", stats.batches_completed);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::batch::BatchProcessor;
use crate::config::IngestConfig;
use crate::core::{DocumentStore, SessionRegistry};
use crate::dispatch::{DispatchStats, IngestDispatcher};
use crate::error::IngestResult;
use crate::session::SessionService;
use crate::types::BatchSubmission;

/// Acknowledgement returned once a batch is queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Accepted {
    /// Queries in the accepted batch.
    pub queries: usize,
    /// Events in the accepted batch.
    pub events: usize,
}

/// Reachability of the external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub registry: bool,
    pub store: bool,
}

impl HealthReport {
    /// Returns true if both collaborators answered.
    pub fn is_healthy(&self) -> bool {
        self.registry && self.store
    }
}

/// The ingestion pipeline with its background dispatcher.
pub struct IngestService {
    processor: BatchProcessor,
    dispatcher: IngestDispatcher,
    sessions: SessionService,
}

impl IngestService {
    /// Builds the pipeline and starts its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: Arc<IngestConfig>,
        registry: Arc<dyn SessionRegistry>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let sessions = SessionService::new(registry.clone(), config.session_ttl());
        let processor = BatchProcessor::new(config, registry, store);
        let dispatcher = IngestDispatcher::start(processor.clone());
        info!(
            registry = processor.registry().backend_name(),
            store = processor.store().backend_name(),
            "Ingest service started"
        );
        Self {
            processor,
            dispatcher,
            sessions,
        }
    }

    /// Checks a batch and queues it for background processing.
    ///
    /// Returns as soon as the batch is queued. Per-record outcomes are only
    /// visible through logs and [`IngestService::stats`].
    pub async fn ingest(&self, batch: BatchSubmission) -> IngestResult<Accepted> {
        batch.check_limits(self.processor.config())?;
        self.processor.preflight(&batch).await?;

        let accepted = Accepted {
            queries: batch.queries.len(),
            events: batch.events.len(),
        };
        self.dispatcher.dispatch(batch)?;
        debug!(
            queries = accepted.queries,
            events = accepted.events,
            "Batch accepted"
        );
        Ok(accepted)
    }

    /// Pings the registry and the store.
    pub async fn health(&self) -> HealthReport {
        let (registry, store) = tokio::join!(
            self.processor.registry().ping(),
            self.processor.store().health_check(),
        );
        if let Err(e) = &store {
            debug!(error = %e, "Store health check failed");
        }
        HealthReport {
            registry,
            store: store.is_ok(),
        }
    }

    /// Session lifecycle operations over the same registry.
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    /// Background processing counters so far.
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Waits for all accepted batches to finish and returns the final counters.
    pub async fn shutdown(self) -> DispatchStats {
        self.dispatcher.shutdown().await
    }
}
