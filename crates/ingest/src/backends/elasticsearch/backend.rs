//! Elasticsearch client setup and configuration.

use std::fmt::Debug;
use std::time::Duration;

use elasticsearch::Elasticsearch;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::Collection;
use crate::error::{BackendError, BackendResult};

pub(crate) const BACKEND_NAME: &str = "elasticsearch";

/// Authentication configuration for Elasticsearch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElasticsearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username for basic auth.
        username: String,
        /// The password for basic auth.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The bearer token.
        token: String,
    },
}

/// Configuration for the Elasticsearch store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    /// Elasticsearch node URLs (e.g., `["http://localhost:9200"]`).
    /// Currently uses the first node (single-node connection pool).
    pub nodes: Vec<String>,

    /// Index name prefix (default: `"ubi"`).
    /// Indices are named: `{prefix}_{collection}`
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Number of primary shards per index (default: 1).
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    /// Number of replica shards per index (default: 1).
    #[serde(default = "default_replicas")]
    pub number_of_replicas: u32,

    /// Refresh interval (default: "1s").
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,

    /// Request timeout in milliseconds (default: 10000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<ElasticsearchAuth>,

    /// Whether to disable certificate validation (default: false).
    /// Only use for development/testing.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_index_prefix() -> String {
    "ubi".to_string()
}

fn default_shards() -> u32 {
    1
}

fn default_replicas() -> u32 {
    1
}

fn default_refresh_interval() -> String {
    "1s".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10000
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["http://localhost:9200".to_string()],
            index_prefix: default_index_prefix(),
            number_of_shards: default_shards(),
            number_of_replicas: default_replicas(),
            refresh_interval: default_refresh_interval(),
            request_timeout_ms: default_request_timeout_ms(),
            auth: None,
            disable_certificate_validation: false,
        }
    }
}

/// Document store backed by Elasticsearch (or OpenSearch).
pub struct ElasticsearchStore {
    client: Elasticsearch,
    config: ElasticsearchConfig,
}

impl Debug for ElasticsearchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchStore {
    /// Creates a new store with the given configuration.
    ///
    /// No request is sent; call [`ElasticsearchStore::initialize`] to create
    /// the indices.
    pub fn new(config: ElasticsearchConfig) -> BackendResult<Self> {
        let client = Self::build_client(&config)?;
        Ok(Self { client, config })
    }

    /// Builds the Elasticsearch client from configuration.
    fn build_client(config: &ElasticsearchConfig) -> BackendResult<Elasticsearch> {
        let url = config
            .nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());

        let parsed_url: elasticsearch::http::Url =
            url.parse().map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);

        let mut builder = TransportBuilder::new(conn_pool)
            .timeout(Duration::from_millis(config.request_timeout_ms));

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                ElasticsearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                ElasticsearchAuth::Bearer { token } => {
                    builder.auth(Credentials::Bearer(token.clone()))
                }
            };
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Returns the Elasticsearch client.
    pub(crate) fn client(&self) -> &Elasticsearch {
        &self.client
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &ElasticsearchConfig {
        &self.config
    }

    /// Returns the index name for a collection.
    pub fn index_name(&self, collection: Collection) -> String {
        format!(
            "{}_{}",
            self.config.index_prefix.to_lowercase(),
            collection.as_str()
        )
    }

    /// Creates the query and event indices if they do not exist.
    pub async fn initialize(&self) -> BackendResult<()> {
        for collection in [Collection::Queries, Collection::Events] {
            super::schema::ensure_index(self, collection).await?;
        }
        Ok(())
    }

    /// Checks cluster health; a red cluster counts as unavailable.
    pub(crate) async fn cluster_health(&self) -> BackendResult<()> {
        let response = self
            .client
            .cluster()
            .health(elasticsearch::cluster::ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Health check failed: {}", e),
            })?;

        let status = response.status_code();
        if !status.is_success() {
            return Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Cluster health returned status {}", status),
            });
        }

        let body = response.json::<Value>().await.map_err(|e| {
            BackendError::internal(
                BACKEND_NAME,
                format!("Failed to parse health response: {}", e),
            )
        })?;

        let cluster_status = body
            .get("status")
            .and_then(|s| s.as_str())
            .unwrap_or("unknown");

        if cluster_status == "red" {
            return Err(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Cluster status is red: {:?}", body),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ElasticsearchConfig::default();
        assert_eq!(config.index_prefix, "ubi");
        assert_eq!(config.number_of_shards, 1);
        assert_eq!(config.request_timeout_ms, 10000);
        assert_eq!(config.nodes, vec!["http://localhost:9200"]);
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let config: ElasticsearchConfig =
            serde_json::from_str(r#"{"nodes": ["http://es:9200"]}"#).unwrap();
        assert_eq!(config.index_prefix, "ubi");
        assert!(config.auth.is_none());
        assert!(!config.disable_certificate_validation);
    }

    #[test]
    fn test_index_name() {
        let store = ElasticsearchStore::new(ElasticsearchConfig::default()).unwrap();
        assert_eq!(store.index_name(Collection::Queries), "ubi_queries");
        assert_eq!(store.index_name(Collection::Events), "ubi_events");

        let store = ElasticsearchStore::new(ElasticsearchConfig {
            index_prefix: "Staging".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(store.index_name(Collection::Events), "staging_events");
    }

    #[test]
    fn test_invalid_node_url() {
        let result = ElasticsearchStore::new(ElasticsearchConfig {
            nodes: vec!["not a url".to_string()],
            ..Default::default()
        });
        assert!(matches!(result, Err(BackendError::ConnectionFailed { .. })));
    }
}
