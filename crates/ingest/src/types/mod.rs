//! Core data types for ingestion.
//!
//! - [`ClientIdentifier`] - the compound `name@version@sessionId[@walletTag]` identifier
//! - [`QuerySubmission`] / [`EventSubmission`] - records as clients send them
//! - [`QueryRecord`] / [`EventRecord`] - validated, enriched documents
//! - [`BatchSubmission`] - queries and events submitted together
//! - [`Session`] - a registry-tracked session handle

mod identifier;
mod records;
mod session;

pub use identifier::{ClientIdentifier, SEGMENT_SEPARATOR, WALLET_TAG_LEN, wallet_tag};
pub use records::{
    Attributes, BatchSubmission, EventRecord, EventSubmission, QueryRecord, QuerySubmission,
    WALLET_ADDRESS_ATTR, WALLET_OPTED_IN_ATTR, utc_timestamp_now,
};
pub use session::Session;
