//! Session handle type.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IdentifierError;

use super::identifier::{ClientIdentifier, wallet_tag};

/// A session tracked by the registry.
///
/// The registry owns expiry; this value is a snapshot handed back to callers
/// of the session lifecycle service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Canonical lowercase UUID.
    pub session_id: String,
    /// Time-to-live applied when the session key was written.
    pub ttl: Duration,
    /// Wallet address associated with the session, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
}

impl Session {
    /// Creates a session snapshot without a wallet.
    pub fn new(session_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            ttl,
            wallet_address: None,
        }
    }

    /// Sets the associated wallet address.
    pub fn with_wallet(mut self, address: impl Into<String>) -> Self {
        self.wallet_address = Some(address.into());
        self
    }

    /// Builds the client identifier an application should send for this session.
    pub fn client_identifier(
        &self,
        name: &str,
        version: &str,
    ) -> Result<ClientIdentifier, IdentifierError> {
        let tag = self.wallet_address.as_deref().and_then(wallet_tag);
        ClientIdentifier::new(name, version, self.session_id.as_str(), tag)
    }
}
