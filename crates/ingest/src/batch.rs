//! Batch preflight and processing.
//!
//! A batch goes through two stages:
//!
//! 1. [`BatchProcessor::preflight`] runs while the submitter waits. It checks
//!    that at least one client id in the batch belongs to a live session.
//! 2. [`BatchProcessor::submit`] runs in the background. Queries and events
//!    each take their own path: every record of the kind is validated
//!    concurrently, then the survivors are written with [`write_chunked`]. The
//!    two paths run side by side, so a slow lookup or failing store call for
//!    one kind never holds up the other.
//!
//! Preflight extracts session ids leniently while per-record validation is
//! strict, so a batch can pass preflight and still have every record dropped.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::IngestConfig;
use crate::core::{
    BulkWriteReport, Collection, DocumentStore, ItemError, SessionRegistry, WriteOp, write_chunked,
};
use crate::error::{BatchRejection, RecordKind, RejectionReason};
use crate::types::{BatchSubmission, ClientIdentifier, EventRecord, QueryRecord};
use crate::validation::RecordValidator;

/// Outcome of processing one batch in the background.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub queries_submitted: usize,
    pub queries_validated: usize,
    pub events_submitted: usize,
    pub events_validated: usize,
    pub queries_written: usize,
    pub events_written: usize,
    /// Queries that already existed in the store.
    pub conflicts: usize,
    /// Dropped records per rejection label.
    pub rejections: BTreeMap<String, usize>,
    /// Store-level item failures.
    pub errors: Vec<ItemError>,
}

impl BatchSummary {
    /// Total records dropped during validation.
    pub fn rejected(&self) -> usize {
        self.rejections.values().sum()
    }
}

/// Runs preflight and background processing for submitted batches.
#[derive(Clone)]
pub struct BatchProcessor {
    config: Arc<IngestConfig>,
    registry: Arc<dyn SessionRegistry>,
    store: Arc<dyn DocumentStore>,
    validator: RecordValidator,
}

impl BatchProcessor {
    /// Creates a processor over the given registry and store.
    pub fn new(
        config: Arc<IngestConfig>,
        registry: Arc<dyn SessionRegistry>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let validator = RecordValidator::new(config.clone(), registry.clone());
        Self {
            config,
            registry,
            store,
            validator,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Returns the session registry.
    pub fn registry(&self) -> &Arc<dyn SessionRegistry> {
        &self.registry
    }

    /// Returns the document store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Rejects the batch if it names client ids but none has a live session.
    ///
    /// A batch without any client id passes; its records are dropped later by
    /// per-record validation. A registry failure counts as an absent session.
    pub async fn preflight(&self, batch: &BatchSubmission) -> Result<(), BatchRejection> {
        let mut client_ids = batch.client_ids().peekable();
        if client_ids.peek().is_none() {
            return Ok(());
        }

        let session_ids: HashSet<&str> = client_ids
            .filter_map(ClientIdentifier::extract_session_id)
            .collect();

        let mut checks = JoinSet::new();
        for session_id in session_ids {
            let registry = self.registry.clone();
            let session_id = session_id.to_string();
            checks.spawn(async move {
                let result = registry.exists(&session_id).await;
                (session_id, result)
            });
        }

        while let Some(joined) = checks.join_next().await {
            match joined {
                Ok((_, Ok(true))) => return Ok(()),
                Ok((session_id, Ok(false))) => {
                    debug!(session_id = %session_id, "Preflight session not found");
                }
                Ok((session_id, Err(e))) => {
                    warn!(session_id = %session_id, error = %e, "Preflight session lookup failed");
                }
                Err(e) => {
                    error!(error = %e, "Preflight session check task failed");
                }
            }
        }

        Err(BatchRejection::AllSessionsInvalid)
    }

    /// Validates and persists a batch, returning what happened to it.
    pub async fn submit(&self, batch: BatchSubmission) -> BatchSummary {
        let BatchSubmission { queries, events } = batch;
        let mut summary = BatchSummary {
            queries_submitted: queries.len(),
            events_submitted: events.len(),
            ..Default::default()
        };

        let queries_validator = self.validator.clone();
        let queries_path = async {
            let Validated {
                accepted,
                rejections,
            } = validate_all(RecordKind::Query, queries, move |q| {
                let validator = queries_validator.clone();
                async move { validator.validate_query(&q).await }
            })
            .await;
            let validated = accepted.len();
            (validated, rejections, self.persist_queries(accepted).await)
        };

        let events_validator = self.validator.clone();
        let events_path = async {
            let Validated {
                accepted,
                rejections,
            } = validate_all(RecordKind::Event, events, move |e| {
                let validator = events_validator.clone();
                async move { validator.validate_event(&e).await }
            })
            .await;
            let validated = accepted.len();
            (validated, rejections, self.persist_events(accepted).await)
        };

        // each kind writes as soon as its own validation finishes
        let (
            (queries_validated, query_rejections, query_report),
            (events_validated, event_rejections, event_report),
        ) = tokio::join!(queries_path, events_path);

        summary.queries_validated = queries_validated;
        summary.events_validated = events_validated;
        for (label, count) in query_rejections.into_iter().chain(event_rejections) {
            *summary.rejections.entry(label.to_string()).or_default() += count;
        }

        summary.queries_written = query_report.written;
        summary.events_written = event_report.written;
        summary.conflicts = query_report.conflicts + event_report.conflicts;
        summary.errors = query_report.errors;
        summary.errors.extend(event_report.errors);

        info!(
            queries_submitted = summary.queries_submitted,
            queries_validated = summary.queries_validated,
            events_submitted = summary.events_submitted,
            events_validated = summary.events_validated,
            queries_written = summary.queries_written,
            events_written = summary.events_written,
            conflicts = summary.conflicts,
            errors = summary.errors.len(),
            "Batch processed"
        );

        summary
    }

    async fn persist_queries(&self, records: Vec<QueryRecord>) -> BulkWriteReport {
        let mut serialization_errors = Vec::new();
        let mut operations = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::to_value(&record) {
                Ok(document) => {
                    operations.push(WriteOp::create_if_absent(record.query_id, document))
                }
                Err(e) => serialization_errors.push(ItemError {
                    id: record.query_id,
                    reason: e.to_string(),
                }),
            }
        }
        self.persist(Collection::Queries, operations, serialization_errors)
            .await
    }

    async fn persist_events(&self, records: Vec<EventRecord>) -> BulkWriteReport {
        let mut serialization_errors = Vec::new();
        let mut operations = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match serde_json::to_value(record) {
                Ok(document) => operations.push(WriteOp::insert(document)),
                Err(e) => serialization_errors.push(ItemError {
                    id: format!("{}#{}", Collection::Events, index),
                    reason: e.to_string(),
                }),
            }
        }
        self.persist(Collection::Events, operations, serialization_errors)
            .await
    }

    async fn persist(
        &self,
        collection: Collection,
        operations: Vec<WriteOp>,
        serialization_errors: Vec<ItemError>,
    ) -> BulkWriteReport {
        let mut report = if operations.is_empty() {
            BulkWriteReport::default()
        } else {
            write_chunked(
                self.store.as_ref(),
                collection,
                operations,
                self.config.bulk_chunk_size,
            )
            .await
        };
        report.attempted += serialization_errors.len();
        report.errors.extend(serialization_errors);
        report
    }
}

/// Accepted records of one kind and rejection counts by label.
struct Validated<R> {
    accepted: Vec<R>,
    rejections: BTreeMap<&'static str, usize>,
}

/// Validates every item concurrently, keeping accepted records in submission order.
async fn validate_all<S, R, F, Fut>(kind: RecordKind, items: Vec<S>, validate: F) -> Validated<R>
where
    S: Send + 'static,
    R: Send + 'static,
    F: Fn(S) -> Fut,
    Fut: Future<Output = Result<R, RejectionReason>> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let validation = validate(item);
        tasks.spawn(async move { (index, validation.await) });
    }

    let mut accepted = Vec::new();
    let mut rejections: BTreeMap<&'static str, usize> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(record))) => accepted.push((index, record)),
            Ok((index, Err(reason))) => {
                debug!(kind = %kind, index, reason = %reason, "Record rejected");
                *rejections.entry(reason.label()).or_default() += 1;
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Validation task failed");
                *rejections.entry("task-failed").or_default() += 1;
            }
        }
    }

    accepted.sort_by_key(|(index, _)| *index);
    Validated {
        accepted: accepted.into_iter().map(|(_, record)| record).collect(),
        rejections,
    }
}
