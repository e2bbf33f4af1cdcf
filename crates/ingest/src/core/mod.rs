//! Collaborator traits and the chunked bulk writer.
//!
//! - [`SessionRegistry`] - session existence and wallet lookups
//! - [`DocumentStore`] - create-if-absent, insert, and bulk writes
//! - [`write_chunked`] - drives a [`DocumentStore`] one fixed-size chunk at a time

pub mod bulk;
pub mod registry;
pub mod store;

pub use bulk::{BulkWriteReport, ItemError, write_chunked};
pub use registry::{SESSION_KEY_PREFIX, SessionRegistry, session_key, wallet_key};
pub use store::{BulkItemResult, Collection, CreateOutcome, DocumentStore, ItemOutcome, WriteOp};
