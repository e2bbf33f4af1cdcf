//! Test infrastructure for the ingestion pipeline.
//!
//! Fixtures build submissions around well-known session ids; the harness wires
//! in-memory backends together and provides collaborators that fail on demand.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;
