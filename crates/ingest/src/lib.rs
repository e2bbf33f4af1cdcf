//! Sonar search-telemetry ingestion
//!
//! This crate accepts client-submitted search queries and interaction events,
//! validates them against a session registry, enriches them with an optional
//! wallet opt-in, and persists them in fixed-size bulk writes to a document
//! store. Individual bad records are dropped without failing the batch, and
//! a failing store item never aborts the rest of its chunk.
//!
//! # Backend Features
//!
//! ```toml
//! [dependencies]
//! sonar-ingest = { version = "0.1", features = ["redis", "elasticsearch"] }
//! ```
//!
//! - `redis` - session registry backed by Redis
//! - `elasticsearch` - document store backed by Elasticsearch/OpenSearch
//!
//! In-memory backends are always available for development and tests.
//!
//! # Architecture
//!
//! - [`types`] - client identifiers, submitted and validated records, sessions
//! - [`core`] - registry and store traits, chunked bulk writer
//! - [`validation`] - per-record validation and enrichment
//! - [`batch`] - batch preflight and background processing
//! - [`dispatch`] - bounded background queue with counters
//! - [`service`] - the [`IngestService`] entry point
//! - [`session`] - session lifecycle operations
//! - [`backends`] - memory, Redis and Elasticsearch implementations
//!
//! # Client Identifiers
//!
//! ```
//! use sonar_ingest::ClientIdentifier;
//!
//! let raw = "web-search@1.4.0@11111111-1111-1111-1111-111111111111@abc123xy";
//! let id = ClientIdentifier::parse(raw).unwrap();
//! assert_eq!(id.name(), "web-search");
//! assert_eq!(id.wallet_tag(), Some("abc123xy"));
//!
//! // the preflight gate only needs the third segment
//! assert_eq!(
//!     ClientIdentifier::extract_session_id("x@y@some-session"),
//!     Some("some-session")
//! );
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod batch;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod service;
pub mod session;
pub mod types;
pub mod validation;

pub use batch::{BatchProcessor, BatchSummary};
pub use config::{IngestConfig, RegistryBackend, ServiceConfig, StoreBackend};
pub use crate::core::{BulkWriteReport, DocumentStore, SessionRegistry};
pub use dispatch::{DispatchStats, IngestDispatcher};
pub use error::{
    BackendError, BatchRejection, DispatchError, IdentifierError, IngestError, IngestResult,
    RejectionReason, SessionError,
};
pub use service::{Accepted, HealthReport, IngestService};
pub use session::SessionService;
pub use types::{
    BatchSubmission, ClientIdentifier, EventRecord, EventSubmission, QueryRecord,
    QuerySubmission, Session,
};
pub use validation::RecordValidator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the tracing subscriber for logging.
///
/// This should be called once at application startup. `RUST_LOG` takes
/// precedence over `level` when set.
///
/// # Arguments
///
/// * `level` - The log level (error, warn, info, debug, trace)
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sonar_ingest={},sonar={}", level, level)));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
