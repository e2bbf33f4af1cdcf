//! Background batch dispatch.
//!
//! Accepted batches are handed to a bounded queue and processed by a single
//! worker task. The worker runs up to `max_in_flight_batches` batches at once
//! in a [`JoinSet`], logs each outcome, and folds it into [`DispatchStats`].
//!
//! Handing a batch over never waits: a full queue is reported as
//! [`DispatchError::QueueFull`] so the submitter can back off.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info};

use crate::batch::{BatchProcessor, BatchSummary};
use crate::error::DispatchError;
use crate::types::BatchSubmission;

/// Counters describing background processing so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Batches handed to the queue.
    pub batches_queued: u64,
    /// Batches processed to completion.
    pub batches_completed: u64,
    /// Batches whose processing task panicked or was cancelled.
    pub batches_failed: u64,
    pub queries_submitted: u64,
    pub queries_validated: u64,
    pub events_submitted: u64,
    pub events_validated: u64,
    /// Records the store confirmed as written.
    pub records_written: u64,
    /// Records dropped during validation.
    pub records_rejected: u64,
    pub conflicts: u64,
    /// Store-level item failures.
    pub item_errors: u64,
    /// Summary of the most recently completed batch.
    pub last_summary: Option<BatchSummary>,
}

impl DispatchStats {
    /// Batches queued or running.
    pub fn pending(&self) -> u64 {
        self.batches_queued
            .saturating_sub(self.batches_completed + self.batches_failed)
    }

    fn record(&mut self, summary: BatchSummary) {
        self.batches_completed += 1;
        self.queries_submitted += summary.queries_submitted as u64;
        self.queries_validated += summary.queries_validated as u64;
        self.events_submitted += summary.events_submitted as u64;
        self.events_validated += summary.events_validated as u64;
        self.records_written += (summary.queries_written + summary.events_written) as u64;
        self.records_rejected += summary.rejected() as u64;
        self.conflicts += summary.conflicts as u64;
        self.item_errors += summary.errors.len() as u64;
        self.last_summary = Some(summary);
    }
}

/// Hands accepted batches to a background worker.
pub struct IngestDispatcher {
    sender: mpsc::Sender<BatchSubmission>,
    capacity: usize,
    stats: Arc<RwLock<DispatchStats>>,
    worker: JoinHandle<()>,
}

impl IngestDispatcher {
    /// Starts the background worker.
    ///
    /// Queue capacity and in-flight limit come from the processor's
    /// configuration. Must be called from within a Tokio runtime.
    pub fn start(processor: BatchProcessor) -> Self {
        let capacity = processor.config().dispatch_queue_capacity.max(1);
        let max_in_flight = processor.config().max_in_flight_batches.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let stats = Arc::new(RwLock::new(DispatchStats::default()));

        let worker = tokio::spawn(Self::run(
            receiver,
            processor,
            max_in_flight,
            stats.clone(),
        ));

        Self {
            sender,
            capacity,
            stats,
            worker,
        }
    }

    /// Queues a batch for background processing.
    pub fn dispatch(&self, batch: BatchSubmission) -> Result<(), DispatchError> {
        match self.sender.try_send(batch) {
            Ok(()) => {
                self.stats.write().batches_queued += 1;
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(DispatchError::QueueFull {
                capacity: self.capacity,
            }),
            Err(TrySendError::Closed(_)) => Err(DispatchError::Closed),
        }
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.read().clone()
    }

    /// Stops accepting batches, waits for queued and running ones, and
    /// returns the final counters.
    pub async fn shutdown(self) -> DispatchStats {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Dispatch worker failed");
        }
        let stats = self.stats.read().clone();
        info!(
            batches_completed = stats.batches_completed,
            batches_failed = stats.batches_failed,
            records_written = stats.records_written,
            "Dispatcher stopped"
        );
        stats
    }

    async fn run(
        mut receiver: mpsc::Receiver<BatchSubmission>,
        processor: BatchProcessor,
        max_in_flight: usize,
        stats: Arc<RwLock<DispatchStats>>,
    ) {
        let mut in_flight: JoinSet<BatchSummary> = JoinSet::new();

        loop {
            tokio::select! {
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    Self::record(&stats, joined);
                }
                received = receiver.recv(), if in_flight.len() < max_in_flight => {
                    match received {
                        Some(batch) => {
                            let processor = processor.clone();
                            in_flight.spawn(async move { processor.submit(batch).await });
                        }
                        None => break,
                    }
                }
            }
        }

        debug!(remaining = in_flight.len(), "Dispatch queue closed, draining");
        while let Some(joined) = in_flight.join_next().await {
            Self::record(&stats, joined);
        }
    }

    fn record(stats: &RwLock<DispatchStats>, joined: Result<BatchSummary, JoinError>) {
        match joined {
            Ok(summary) => {
                debug!(
                    written = summary.queries_written + summary.events_written,
                    rejected = summary.rejected(),
                    "Batch completed"
                );
                stats.write().record(summary);
            }
            Err(e) => {
                error!(error = %e, "Batch processing task failed");
                stats.write().batches_failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{InMemoryDocumentStore, InMemorySessionRegistry};
    use crate::config::IngestConfig;
    use crate::core::{Collection, SessionRegistry};
    use crate::types::EventSubmission;
    use std::time::Duration;

    const SESSION: &str = "11111111-1111-1111-1111-111111111111";
    const CLIENT: &str = "web-search@2.1.0-beta.1@11111111-1111-1111-1111-111111111111";

    async fn processor(store: Arc<InMemoryDocumentStore>) -> BatchProcessor {
        let registry = Arc::new(InMemorySessionRegistry::new());
        registry.create(SESSION, Duration::from_secs(60)).await.unwrap();
        BatchProcessor::new(Arc::new(IngestConfig::for_testing()), registry, store)
    }

    fn events(n: usize) -> BatchSubmission {
        let events = (0..n)
            .map(|_| EventSubmission {
                query_id: Some("q-1".to_string()),
                action_name: Some("click".to_string()),
                client_id: Some(CLIENT.to_string()),
                ..Default::default()
            })
            .collect();
        BatchSubmission::new(vec![], events)
    }

    #[tokio::test]
    async fn test_shutdown_drains_queued_batches() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let dispatcher = IngestDispatcher::start(processor(store.clone()).await);

        for _ in 0..3 {
            dispatcher.dispatch(events(2)).unwrap();
        }
        let stats = dispatcher.shutdown().await;

        assert_eq!(stats.batches_queued, 3);
        assert_eq!(stats.batches_completed, 3);
        assert_eq!(stats.pending(), 0);
        assert_eq!(stats.events_submitted, 6);
        assert_eq!(stats.records_written, 6);
        assert_eq!(store.count(Collection::Events), 6);
        assert!(stats.last_summary.is_some());
    }

    #[test]
    fn test_stats_record_summary() {
        let mut stats = DispatchStats {
            batches_queued: 2,
            ..Default::default()
        };
        let mut summary = BatchSummary {
            queries_submitted: 3,
            queries_validated: 2,
            queries_written: 1,
            conflicts: 1,
            ..Default::default()
        };
        summary.rejections.insert("missing-field".to_string(), 1);
        stats.record(summary);

        assert_eq!(stats.batches_completed, 1);
        assert_eq!(stats.pending(), 1);
        assert_eq!(stats.records_written, 1);
        assert_eq!(stats.records_rejected, 1);
        assert_eq!(stats.conflicts, 1);
    }
}
