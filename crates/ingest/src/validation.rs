//! Per-record validation and wallet enrichment.
//!
//! [`RecordValidator`] turns a submission into a validated record, or a
//! [`RejectionReason`] explaining why it was dropped. The checks run in order:
//!
//! 1. required fields are present
//! 2. (queries) the application is allow-listed
//! 3. the client identifier passes full-format validation
//! 4. a session id can be extracted from it
//! 5. the session exists in the registry; a failed lookup counts as absent
//! 6. a wallet associated with the session is merged into the attributes
//! 7. a missing timestamp is filled with the current UTC instant
//!
//! Enrichment is best-effort: a failed wallet lookup is logged and the record
//! is accepted without wallet attributes.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::IngestConfig;
use crate::core::SessionRegistry;
use crate::error::RejectionReason;
use crate::types::{
    Attributes, ClientIdentifier, EventRecord, EventSubmission, QueryRecord, QuerySubmission,
    WALLET_ADDRESS_ATTR, WALLET_OPTED_IN_ATTR, utc_timestamp_now,
};

/// Validates and enriches submitted records against the session registry.
#[derive(Clone)]
pub struct RecordValidator {
    config: Arc<IngestConfig>,
    registry: Arc<dyn SessionRegistry>,
}

impl RecordValidator {
    /// Creates a validator.
    pub fn new(config: Arc<IngestConfig>, registry: Arc<dyn SessionRegistry>) -> Self {
        Self { config, registry }
    }

    /// Validates a submitted query.
    pub async fn validate_query(
        &self,
        submission: &QuerySubmission,
    ) -> Result<QueryRecord, RejectionReason> {
        let application = required(&submission.application, "application")?;
        let query_id = required(&submission.query_id, "query_id")?;
        let client_id = required(&submission.client_id, "client_id")?;
        let user_query = required(&submission.user_query, "user_query")?;

        if !self.config.is_application_allowed(application) {
            return Err(RejectionReason::ApplicationNotAllowed(application.to_string()));
        }

        let session_id = self.resolve_session(client_id).await?;
        let query_attributes = self
            .enrich(&session_id, submission.query_attributes.as_ref())
            .await;

        Ok(QueryRecord {
            application: application.to_string(),
            query_id: query_id.to_string(),
            client_id: client_id.to_string(),
            user_query: user_query.to_string(),
            timestamp: timestamp_or_now(&submission.timestamp),
            query_attributes,
            query_response_id: submission.query_response_id.clone(),
            query_response_hit_ids: submission.query_response_hit_ids.clone(),
        })
    }

    /// Validates a submitted event.
    pub async fn validate_event(
        &self,
        submission: &EventSubmission,
    ) -> Result<EventRecord, RejectionReason> {
        let query_id = required(&submission.query_id, "query_id")?;
        let action_name = required(&submission.action_name, "action_name")?;
        let client_id = required(&submission.client_id, "client_id")?;

        let session_id = self.resolve_session(client_id).await?;
        let event_attributes = self
            .enrich(&session_id, submission.event_attributes.as_ref())
            .await;

        Ok(EventRecord {
            query_id: query_id.to_string(),
            action_name: action_name.to_string(),
            client_id: client_id.to_string(),
            timestamp: timestamp_or_now(&submission.timestamp),
            message_type: submission.message_type.clone(),
            message: submission.message.clone(),
            event_attributes,
        })
    }

    /// Parses the client identifier and checks its session is live.
    async fn resolve_session(&self, client_id: &str) -> Result<String, RejectionReason> {
        ClientIdentifier::parse(client_id).map_err(RejectionReason::InvalidIdentifier)?;

        let session_id = ClientIdentifier::extract_session_id(client_id)
            .ok_or(RejectionReason::MissingSessionId)?;

        match self.registry.exists(session_id).await {
            Ok(true) => Ok(session_id.to_string()),
            Ok(false) => Err(RejectionReason::SessionNotFound(session_id.to_string())),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    registry = self.registry.backend_name(),
                    error = %e,
                    "Session lookup failed, treating session as absent"
                );
                Err(RejectionReason::SessionCheckFailed(e.to_string()))
            }
        }
    }

    /// Returns the attributes to store, with wallet attributes merged in when
    /// the session has a wallet. The input map is never modified.
    async fn enrich(
        &self,
        session_id: &str,
        attributes: Option<&Attributes>,
    ) -> Option<Attributes> {
        let wallet = match self.registry.get_wallet(session_id).await {
            Ok(wallet) => wallet,
            Err(e) => {
                debug!(
                    session_id = %session_id,
                    error = %e,
                    "Wallet lookup failed, skipping enrichment"
                );
                None
            }
        };

        let Some(address) = wallet else {
            return attributes.cloned();
        };

        let mut enriched = attributes.cloned().unwrap_or_default();
        enriched.insert(WALLET_ADDRESS_ATTR.to_string(), Value::String(address));
        enriched.insert(WALLET_OPTED_IN_ATTR.to_string(), Value::Bool(true));
        Some(enriched)
    }
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
) -> Result<&'a str, RejectionReason> {
    value.as_deref().ok_or(RejectionReason::MissingField(field))
}

fn timestamp_or_now(timestamp: &Option<String>) -> String {
    timestamp.clone().unwrap_or_else(utc_timestamp_now)
}
