//! Redis session registry.
//!
//! Sessions are stored as `SET session:<id> 1 EX <ttl>` and wallets as
//! `SET session:wallet:<id> <address> EX <ttl>`. Every command runs through a
//! shared [`ConnectionManager`], which reconnects on its own, and is bounded by
//! the configured command timeout.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{SessionRegistry, session_key, wallet_key};
use crate::error::{BackendError, BackendResult};

const BACKEND_NAME: &str = "redis";

/// Configuration for the Redis registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisRegistryConfig {
    /// Connection URL (default: `redis://127.0.0.1:6379`).
    #[serde(default = "default_url")]
    pub url: String,

    /// Per-command timeout in milliseconds (default: 500).
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_command_timeout_ms() -> u64 {
    500
}

impl Default for RedisRegistryConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

impl RedisRegistryConfig {
    /// The per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

/// Session registry backed by Redis.
#[derive(Clone)]
pub struct RedisSessionRegistry {
    connection: ConnectionManager,
    config: RedisRegistryConfig,
}

impl std::fmt::Debug for RedisSessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSessionRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisSessionRegistry {
    /// Connects to Redis.
    ///
    /// The initial connection is bounded by the command timeout.
    pub async fn connect(config: RedisRegistryConfig) -> BackendResult<Self> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                message: format!("Invalid URL: {}", e),
            }
        })?;

        let connection = tokio::time::timeout(
            config.command_timeout(),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| BackendError::Timeout {
            backend_name: BACKEND_NAME.to_string(),
            operation: "CONNECT".to_string(),
            timeout_ms: config.command_timeout_ms,
        })??;

        info!(url = %config.url, "Connected to Redis session registry");
        Ok(Self { connection, config })
    }

    /// Returns the registry configuration.
    pub fn config(&self) -> &RedisRegistryConfig {
        &self.config
    }

    /// Runs one command with the configured timeout.
    async fn run<T, F>(&self, operation: &'static str, command: F) -> BackendResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.config.command_timeout(), command).await {
            Ok(result) => result.map_err(BackendError::from),
            Err(_) => Err(BackendError::Timeout {
                backend_name: BACKEND_NAME.to_string(),
                operation: operation.to_string(),
                timeout_ms: self.config.command_timeout_ms,
            }),
        }
    }
}

fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl SessionRegistry for RedisSessionRegistry {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn exists(&self, session_id: &str) -> BackendResult<bool> {
        let mut conn = self.connection.clone();
        let key = session_key(session_id);
        self.run("EXISTS", async move { conn.exists(&key).await })
            .await
    }

    async fn get_wallet(&self, session_id: &str) -> BackendResult<Option<String>> {
        let mut conn = self.connection.clone();
        let key = wallet_key(session_id);
        self.run("GET", async move { conn.get(&key).await }).await
    }

    async fn set_wallet(
        &self,
        session_id: &str,
        address: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        let mut conn = self.connection.clone();
        let key = wallet_key(session_id);
        let address = address.to_string();
        self.run("SET", async move {
            conn.set_ex(&key, address, ttl_secs(ttl)).await
        })
        .await
    }

    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()> {
        let mut conn = self.connection.clone();
        let key = session_key(session_id);
        self.run("SET", async move { conn.set_ex(&key, 1, ttl_secs(ttl)).await })
            .await
    }

    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool> {
        let mut conn = self.connection.clone();
        let key = session_key(session_id);
        let seconds = i64::try_from(ttl_secs(ttl)).unwrap_or(i64::MAX);
        self.run("EXPIRE", async move { conn.expire(&key, seconds).await })
            .await
    }

    async fn delete(&self, session_id: &str) -> BackendResult<()> {
        let mut conn = self.connection.clone();
        let keys = vec![session_key(session_id), wallet_key(session_id)];
        let removed: usize = self
            .run("DEL", async move { conn.del(&keys).await })
            .await?;
        debug!(session_id = %session_id, removed, "Deleted session keys");
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        let result: BackendResult<String> = self
            .run("PING", async move {
                redis::cmd("PING").query_async(&mut conn).await
            })
            .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Redis ping failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RedisRegistryConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.command_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let config: RedisRegistryConfig =
            serde_json::from_str(r#"{"url": "redis://cache:6379/2"}"#).unwrap();
        assert_eq!(config.url, "redis://cache:6379/2");
        assert_eq!(config.command_timeout_ms, 500);
    }

    #[test]
    fn test_ttl_is_at_least_one_second() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(86400)), 86400);
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisSessionRegistry::connect(RedisRegistryConfig {
            url: "not-a-redis-url".to_string(),
            ..Default::default()
        })
        .await;
        assert!(matches!(result, Err(BackendError::ConnectionFailed { .. })));
    }
}
