//! Elasticsearch document store.
//!
//! Each collection is stored in its own index named `{prefix}_{collection}`
//! (e.g., `ubi_queries`, `ubi_events`). Queries are written with `_create`
//! keyed by `query_id`, so a resubmitted query yields a 409 that the store
//! reports as a conflict. Events are indexed under generated ids.
//!
//! # Example
//!
//! ```ignore
//! use sonar_ingest::backends::elasticsearch::{ElasticsearchConfig, ElasticsearchStore};
//!
//! let config = ElasticsearchConfig {
//!     nodes: vec!["http://localhost:9200".to_string()],
//!     ..Default::default()
//! };
//! let store = ElasticsearchStore::new(config)?;
//! store.initialize().await?;
//! ```

mod backend;
mod schema;
mod storage;

pub use backend::{ElasticsearchAuth, ElasticsearchConfig, ElasticsearchStore};
pub use storage::{bulk_operations, parse_bulk_response};
