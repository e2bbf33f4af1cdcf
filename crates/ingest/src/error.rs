//! Error types for the ingestion pipeline.
//!
//! The hierarchy separates errors raised by external collaborators (session
//! registry and document store), per-record rejection reasons that never reach
//! the submitter, and batch-level rejections, which are the only failures a
//! submitter observes synchronously.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

/// The umbrella error type for ingestion operations.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Batch-level rejection
    #[error(transparent)]
    Rejected(#[from] BatchRejection),

    /// Background dispatch errors
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Errors produced by the client identifier codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The identifier does not match `name@version@sessionId[@walletTag]`.
    #[error("invalid client identifier: {reason}")]
    InvalidFormat { reason: String },
}

/// Errors originating from an external collaborator (registry or store).
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection to the backend failed.
    #[error("connection failed to {backend_name}: {message}")]
    ConnectionFailed {
        backend_name: String,
        message: String,
    },

    /// A single call exceeded its time budget.
    #[error("{operation} on {backend_name} timed out after {timeout_ms}ms")]
    Timeout {
        backend_name: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The backend rejected or failed to execute a request.
    #[error("query execution failed: {message}")]
    QueryError { message: String },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

impl BackendError {
    /// Builds an [`BackendError::Internal`] without an underlying source.
    pub fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        }
    }
}

/// Why a single submitted record was dropped.
///
/// Rejections are counted and logged by the batch processor; they are never
/// surfaced to the submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// A structurally required field was absent.
    MissingField(&'static str),
    /// The query's application is not allow-listed.
    ApplicationNotAllowed(String),
    /// The client identifier failed full-format validation.
    InvalidIdentifier(IdentifierError),
    /// No session id could be extracted from the client identifier.
    MissingSessionId,
    /// The session is unknown or expired.
    SessionNotFound(String),
    /// The registry could not answer; treated as an unknown session.
    SessionCheckFailed(String),
}

impl RejectionReason {
    /// Short machine-friendly label used for log fields and counters.
    pub fn label(&self) -> &'static str {
        match self {
            RejectionReason::MissingField(_) => "missing-field",
            RejectionReason::ApplicationNotAllowed(_) => "application-not-allowed",
            RejectionReason::InvalidIdentifier(_) => "invalid-identifier",
            RejectionReason::MissingSessionId => "missing-session-id",
            RejectionReason::SessionNotFound(_) => "session-not-found",
            RejectionReason::SessionCheckFailed(_) => "session-check-failed",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::MissingField(field) => write!(f, "missing required field: {}", field),
            RejectionReason::ApplicationNotAllowed(app) => {
                write!(f, "application not allowed: {}", app)
            }
            RejectionReason::InvalidIdentifier(err) => write!(f, "{}", err),
            RejectionReason::MissingSessionId => write!(f, "no session id in client identifier"),
            RejectionReason::SessionNotFound(id) => write!(f, "session not found: {}", id),
            RejectionReason::SessionCheckFailed(msg) => {
                write!(f, "session check failed: {}", msg)
            }
        }
    }
}

/// The kind of record in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// A search query record.
    Query,
    /// An interaction event record.
    Event,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Query => write!(f, "query"),
            RecordKind::Event => write!(f, "event"),
        }
    }
}

/// A batch-level rejection, returned synchronously to the submitter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchRejection {
    /// The batch carries more records of one kind than allowed.
    #[error("too many {kind} records: {count} exceeds maximum of {max}")]
    TooManyRecords {
        kind: RecordKind,
        count: usize,
        max: usize,
    },

    /// A record violates a structural constraint.
    #[error("invalid {kind} record at index {index}: {reason}")]
    InvalidRecord {
        kind: RecordKind,
        index: usize,
        reason: String,
    },

    /// Client ids were present but none resolved to a live session.
    #[error("no valid session found for any client id in the batch")]
    AllSessionsInvalid,
}

/// Errors raised by the session lifecycle service.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session does not exist or has expired.
    #[error("session not found: {session_id}")]
    NotFound { session_id: String },

    /// The session id is not a canonical UUID.
    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    /// The wallet address cannot be associated with a session.
    #[error("invalid wallet address: {message}")]
    InvalidWallet { message: String },

    /// The registry failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors raised when handing a batch to the background dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatch queue is at capacity.
    #[error("dispatch queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The dispatcher has been shut down.
    #[error("dispatcher is closed")]
    Closed,
}

/// Result type alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Result type alias for registry and store calls.
pub type BackendResult<T> = Result<T, BackendError>;

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::SerializationError {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            BackendError::ConnectionFailed {
                backend_name: "redis".to_string(),
                message: err.to_string(),
            }
        } else {
            BackendError::Internal {
                backend_name: "redis".to_string(),
                message: err.to_string(),
                source: Some(Box::new(err)),
            }
        }
    }
}

#[cfg(feature = "elasticsearch")]
impl From<elasticsearch::Error> for BackendError {
    fn from(err: elasticsearch::Error) -> Self {
        BackendError::Internal {
            backend_name: "elasticsearch".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}
