//! Session lifecycle operations.
//!
//! Sessions are created on request, optionally associated with a wallet, and
//! removed explicitly or by registry-enforced expiry. A session's TTL is only
//! extended by an explicit [`SessionService::refresh`]; the wallet key has its
//! own TTL, set when the wallet is associated.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uuid::Uuid;

use crate::core::SessionRegistry;
use crate::error::SessionError;
use crate::types::{ClientIdentifier, Session, wallet_tag};

/// Creates, extends and ends sessions in the registry.
#[derive(Clone)]
pub struct SessionService {
    registry: Arc<dyn SessionRegistry>,
    ttl: Duration,
}

impl SessionService {
    /// Creates a service applying `ttl` to every key it writes.
    pub fn new(registry: Arc<dyn SessionRegistry>, ttl: Duration) -> Self {
        Self { registry, ttl }
    }

    /// Starts a new session with a fresh v4 UUID.
    pub async fn start(&self) -> Result<Session, SessionError> {
        let session_id = Uuid::new_v4().to_string();
        self.registry.create(&session_id, self.ttl).await?;
        info!(session_id = %session_id, ttl_secs = self.ttl.as_secs(), "Session started");
        Ok(Session::new(session_id, self.ttl))
    }

    /// Associates a wallet address with a live session and returns its tag.
    ///
    /// A later association replaces an earlier one. The session's own TTL is
    /// left untouched.
    pub async fn associate_wallet(
        &self,
        session_id: &str,
        address: &str,
    ) -> Result<String, SessionError> {
        ClientIdentifier::check_session_id(session_id)?;
        if !address.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SessionError::InvalidWallet {
                message: "address must be alphanumeric".to_string(),
            });
        }
        let tag = wallet_tag(address).ok_or_else(|| SessionError::InvalidWallet {
            message: "address is shorter than the wallet tag".to_string(),
        })?;

        if !self.registry.exists(session_id).await? {
            return Err(SessionError::NotFound {
                session_id: session_id.to_string(),
            });
        }

        self.registry
            .set_wallet(session_id, address, self.ttl)
            .await?;
        debug!(session_id = %session_id, wallet_tag = %tag, "Wallet associated");
        Ok(tag)
    }

    /// Resets the session's TTL. Returns false if the session is gone.
    pub async fn refresh(&self, session_id: &str) -> Result<bool, SessionError> {
        ClientIdentifier::check_session_id(session_id)?;
        Ok(self.registry.refresh(session_id, self.ttl).await?)
    }

    /// Ends a session, removing its wallet association as well.
    pub async fn end(&self, session_id: &str) -> Result<(), SessionError> {
        ClientIdentifier::check_session_id(session_id)?;
        self.registry.delete(session_id).await?;
        info!(session_id = %session_id, "Session ended");
        Ok(())
    }

    /// Returns the session with its wallet, or `None` if it is not live.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        ClientIdentifier::check_session_id(session_id)?;
        if !self.registry.exists(session_id).await? {
            return Ok(None);
        }
        let session = Session::new(session_id, self.ttl);
        Ok(Some(match self.registry.get_wallet(session_id).await? {
            Some(address) => session.with_wallet(address),
            None => session,
        }))
    }
}
