//! Configuration for the ingestion pipeline.
//!
//! Two layers are provided:
//!
//! - [`IngestConfig`] holds the immutable values the pipeline components read.
//!   It is built once and shared as `Arc<IngestConfig>`.
//! - [`ServiceConfig`] is the command-line/environment surface of the `sonar`
//!   binary. It carries backend connection settings and derives an
//!   [`IngestConfig`] via [`ServiceConfig::ingest_config`].
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SONAR_LOG_LEVEL` | info | Log level |
//! | `SONAR_ALLOWED_APPLICATIONS` | (empty) | Comma-separated application allow-list |
//! | `SONAR_MAX_BATCH_SIZE` | 100 | Max queries (and max events) per batch |
//! | `SONAR_MAX_QUERY_LENGTH` | 5000 | Max `user_query` characters |
//! | `SONAR_MAX_HIT_IDS` | 100 | Max result-hit ids per query |
//! | `SONAR_MAX_ACTION_NAME_LENGTH` | 100 | Max `action_name` characters |
//! | `SONAR_BULK_CHUNK_SIZE` | 20 | Documents per bulk request |
//! | `SONAR_SESSION_TTL_SECS` | 86400 | Session time-to-live |
//! | `SONAR_DISPATCH_QUEUE_CAPACITY` | 1024 | Pending background batches |
//! | `SONAR_MAX_IN_FLIGHT_BATCHES` | 8 | Concurrently processed batches |
//! | `SONAR_REGISTRY` | memory | `memory` or `redis` |
//! | `SONAR_REDIS_URL` | redis://127.0.0.1:6379 | Redis connection URL |
//! | `SONAR_REDIS_TIMEOUT_MS` | 500 | Per-command Redis timeout |
//! | `SONAR_STORE` | memory | `memory` or `elasticsearch` |
//! | `SONAR_ELASTICSEARCH_NODES` | http://localhost:9200 | Comma-separated node URLs |
//! | `SONAR_ELASTICSEARCH_INDEX_PREFIX` | ubi | Index name prefix |
//! | `SONAR_ELASTICSEARCH_USERNAME` | | Basic auth user |
//! | `SONAR_ELASTICSEARCH_PASSWORD` | | Basic auth password |
//! | `SONAR_ELASTICSEARCH_TIMEOUT_MS` | 10000 | Per-request timeout |

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

/// Immutable configuration consumed by the pipeline components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Application names queries may declare.
    #[serde(default)]
    pub allowed_applications: BTreeSet<String>,

    /// Maximum queries, and separately maximum events, per batch.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum `user_query` length in characters.
    #[serde(default = "default_max_query_length")]
    pub max_query_length: usize,

    /// Maximum number of result-hit ids on a query.
    #[serde(default = "default_max_hit_ids")]
    pub max_hit_ids: usize,

    /// Maximum `action_name` length in characters.
    #[serde(default = "default_max_action_name_length")]
    pub max_action_name_length: usize,

    /// Documents per bulk request.
    #[serde(default = "default_bulk_chunk_size")]
    pub bulk_chunk_size: usize,

    /// Time-to-live for session and wallet keys, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Number of batches that may wait for background processing.
    #[serde(default = "default_dispatch_queue_capacity")]
    pub dispatch_queue_capacity: usize,

    /// Number of batches processed concurrently in the background.
    #[serde(default = "default_max_in_flight_batches")]
    pub max_in_flight_batches: usize,
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_query_length() -> usize {
    5000
}

fn default_max_hit_ids() -> usize {
    100
}

fn default_max_action_name_length() -> usize {
    100
}

fn default_bulk_chunk_size() -> usize {
    20
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

fn default_dispatch_queue_capacity() -> usize {
    1024
}

fn default_max_in_flight_batches() -> usize {
    8
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_applications: BTreeSet::new(),
            max_batch_size: default_max_batch_size(),
            max_query_length: default_max_query_length(),
            max_hit_ids: default_max_hit_ids(),
            max_action_name_length: default_max_action_name_length(),
            bulk_chunk_size: default_bulk_chunk_size(),
            session_ttl_secs: default_session_ttl_secs(),
            dispatch_queue_capacity: default_dispatch_queue_capacity(),
            max_in_flight_batches: default_max_in_flight_batches(),
        }
    }
}

impl IngestConfig {
    /// Sets the application allow-list.
    pub fn with_allowed_applications<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_applications = apps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the bulk chunk size.
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size;
        self
    }

    /// Sets the per-kind batch size limit.
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Returns true if queries may declare this application.
    pub fn is_application_allowed(&self, application: &str) -> bool {
        self.allowed_applications.contains(application)
    }

    /// Session and wallet key time-to-live.
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.allowed_applications.is_empty() {
            errors.push("At least one allowed application is required".to_string());
        }

        if self.max_batch_size == 0 {
            errors.push("Max batch size cannot be 0".to_string());
        }

        if self.bulk_chunk_size == 0 {
            errors.push("Bulk chunk size cannot be 0".to_string());
        }

        if self.session_ttl_secs == 0 {
            errors.push("Session TTL cannot be 0".to_string());
        }

        if self.dispatch_queue_capacity == 0 {
            errors.push("Dispatch queue capacity cannot be 0".to_string());
        }

        if self.max_in_flight_batches == 0 {
            errors.push("Max in-flight batches cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for tests.
    pub fn for_testing() -> Self {
        Self::default().with_allowed_applications(["graphql-images", "web-search"])
    }
}

/// Which session registry backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegistryBackend {
    /// Process-local registry (sessions vanish on restart).
    Memory,
    /// Redis-backed registry.
    Redis,
}

impl fmt::Display for RegistryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryBackend::Memory => write!(f, "memory"),
            RegistryBackend::Redis => write!(f, "redis"),
        }
    }
}

/// Which document store backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Process-local store.
    Memory,
    /// Elasticsearch or OpenSearch.
    Elasticsearch,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Elasticsearch => write!(f, "elasticsearch"),
        }
    }
}

/// Service configuration read from command-line arguments and environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "sonar")]
#[command(about = "Search-behavior telemetry ingestion")]
pub struct ServiceConfig {
    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "SONAR_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Allowed application names (comma-separated).
    #[arg(
        long,
        env = "SONAR_ALLOWED_APPLICATIONS",
        value_delimiter = ',',
        global = true
    )]
    pub allowed_applications: Vec<String>,

    /// Maximum queries, and separately maximum events, per batch.
    #[arg(long, env = "SONAR_MAX_BATCH_SIZE", default_value = "100", global = true)]
    pub max_batch_size: usize,

    /// Maximum user query length in characters.
    #[arg(long, env = "SONAR_MAX_QUERY_LENGTH", default_value = "5000", global = true)]
    pub max_query_length: usize,

    /// Maximum result-hit ids per query.
    #[arg(long, env = "SONAR_MAX_HIT_IDS", default_value = "100", global = true)]
    pub max_hit_ids: usize,

    /// Maximum action name length in characters.
    #[arg(
        long,
        env = "SONAR_MAX_ACTION_NAME_LENGTH",
        default_value = "100",
        global = true
    )]
    pub max_action_name_length: usize,

    /// Documents per bulk request.
    #[arg(long, env = "SONAR_BULK_CHUNK_SIZE", default_value = "20", global = true)]
    pub bulk_chunk_size: usize,

    /// Session time-to-live in seconds.
    #[arg(long, env = "SONAR_SESSION_TTL_SECS", default_value = "86400", global = true)]
    pub session_ttl_secs: u64,

    /// Pending background batches before submissions are refused.
    #[arg(
        long,
        env = "SONAR_DISPATCH_QUEUE_CAPACITY",
        default_value = "1024",
        global = true
    )]
    pub dispatch_queue_capacity: usize,

    /// Batches processed concurrently in the background.
    #[arg(long, env = "SONAR_MAX_IN_FLIGHT_BATCHES", default_value = "8", global = true)]
    pub max_in_flight_batches: usize,

    /// Session registry backend.
    #[arg(long, env = "SONAR_REGISTRY", value_enum, default_value = "memory", global = true)]
    pub registry: RegistryBackend,

    /// Redis connection URL.
    #[arg(
        long,
        env = "SONAR_REDIS_URL",
        default_value = "redis://127.0.0.1:6379",
        global = true
    )]
    pub redis_url: String,

    /// Per-command Redis timeout in milliseconds.
    #[arg(long, env = "SONAR_REDIS_TIMEOUT_MS", default_value = "500", global = true)]
    pub redis_timeout_ms: u64,

    /// Document store backend.
    #[arg(long, env = "SONAR_STORE", value_enum, default_value = "memory", global = true)]
    pub store: StoreBackend,

    /// Elasticsearch node URLs (comma-separated).
    #[arg(
        long,
        env = "SONAR_ELASTICSEARCH_NODES",
        default_value = "http://localhost:9200",
        global = true
    )]
    pub elasticsearch_nodes: String,

    /// Elasticsearch index name prefix.
    #[arg(
        long,
        env = "SONAR_ELASTICSEARCH_INDEX_PREFIX",
        default_value = "ubi",
        global = true
    )]
    pub elasticsearch_index_prefix: String,

    /// Elasticsearch basic auth username.
    #[arg(long, env = "SONAR_ELASTICSEARCH_USERNAME", global = true)]
    pub elasticsearch_username: Option<String>,

    /// Elasticsearch basic auth password.
    #[arg(long, env = "SONAR_ELASTICSEARCH_PASSWORD", global = true)]
    pub elasticsearch_password: Option<String>,

    /// Elasticsearch request timeout in milliseconds.
    #[arg(
        long,
        env = "SONAR_ELASTICSEARCH_TIMEOUT_MS",
        default_value = "10000",
        global = true
    )]
    pub elasticsearch_timeout_ms: u64,
}

impl ServiceConfig {
    /// Derives the pipeline configuration.
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            allowed_applications: self
                .allowed_applications
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_batch_size: self.max_batch_size,
            max_query_length: self.max_query_length,
            max_hit_ids: self.max_hit_ids,
            max_action_name_length: self.max_action_name_length,
            bulk_chunk_size: self.bulk_chunk_size,
            session_ttl_secs: self.session_ttl_secs,
            dispatch_queue_capacity: self.dispatch_queue_capacity,
            max_in_flight_batches: self.max_in_flight_batches,
        }
    }

    /// Elasticsearch node URLs, trimmed and without empty entries.
    pub fn elasticsearch_node_list(&self) -> Vec<String> {
        self.elasticsearch_nodes
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = match self.ingest_config().validate() {
            Ok(()) => Vec::new(),
            Err(errors) => errors,
        };

        if self.registry == RegistryBackend::Redis && self.redis_timeout_ms == 0 {
            errors.push("Redis timeout cannot be 0".to_string());
        }

        if self.store == StoreBackend::Elasticsearch {
            if self.elasticsearch_node_list().is_empty() {
                errors.push("At least one Elasticsearch node is required".to_string());
            }
            if self.elasticsearch_username.is_some() != self.elasticsearch_password.is_some() {
                errors.push("Elasticsearch username and password must be set together".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
