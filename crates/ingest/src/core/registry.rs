//! Session registry trait.
//!
//! The registry is an external key-value cache with per-key TTL. Sessions and
//! their optional wallet association live under two independent keys:
//!
//! - `session:<id>` - existence of the key is the session
//! - `session:wallet:<id>` - the associated wallet address
//!
//! Both keys expire on their own; writing one never touches the other's TTL.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendResult;

/// Namespace shared by every registry key.
pub const SESSION_KEY_PREFIX: &str = "session";

/// Registry key holding a session.
pub fn session_key(session_id: &str) -> String {
    format!("{}:{}", SESSION_KEY_PREFIX, session_id)
}

/// Registry key holding a session's wallet address.
pub fn wallet_key(session_id: &str) -> String {
    format!("{}:wallet:{}", SESSION_KEY_PREFIX, session_id)
}

/// Key-value operations against the session registry.
///
/// Implementations must apply a bounded per-call timeout and report it as
/// [`BackendError::Timeout`](crate::error::BackendError::Timeout).
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    /// Returns a human-readable name for this registry backend.
    fn backend_name(&self) -> &'static str;

    /// Returns true if the session key exists and has not expired.
    async fn exists(&self, session_id: &str) -> BackendResult<bool>;

    /// Returns the wallet address associated with the session, if any.
    async fn get_wallet(&self, session_id: &str) -> BackendResult<Option<String>>;

    /// Associates a wallet address with the session, replacing any previous one.
    async fn set_wallet(&self, session_id: &str, address: &str, ttl: Duration)
    -> BackendResult<()>;

    /// Creates (or overwrites) the session key with the given TTL.
    async fn create(&self, session_id: &str, ttl: Duration) -> BackendResult<()>;

    /// Resets the session key's TTL. Returns false if the session does not exist.
    async fn refresh(&self, session_id: &str, ttl: Duration) -> BackendResult<bool>;

    /// Deletes the session key and its wallet key.
    async fn delete(&self, session_id: &str) -> BackendResult<()>;

    /// Returns true if the registry answers.
    async fn ping(&self) -> bool;
}
