//! Registry and store backend implementations.
//!
//! # Available Backends
//!
//! | Backend | Feature | Implements |
//! |---------|---------|------------|
//! | Memory | (always) | [`SessionRegistry`](crate::core::SessionRegistry), [`DocumentStore`](crate::core::DocumentStore) |
//! | Redis | `redis` | [`SessionRegistry`](crate::core::SessionRegistry) |
//! | Elasticsearch | `elasticsearch` | [`DocumentStore`](crate::core::DocumentStore) |
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "redis")]
//! use sonar_ingest::backends::redis::{RedisRegistryConfig, RedisSessionRegistry};
//!
//! # #[cfg(feature = "redis")]
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = RedisSessionRegistry::connect(RedisRegistryConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
