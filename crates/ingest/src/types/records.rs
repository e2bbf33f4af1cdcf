//! Submitted and validated telemetry records.
//!
//! Submissions are the raw shapes clients send; every field is optional so that
//! a malformed record can be dropped individually instead of failing the batch
//! at deserialization time. Validated records ([`QueryRecord`], [`EventRecord`])
//! are produced by the [`RecordValidator`](crate::validation::RecordValidator)
//! and are the documents written to the store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::IngestConfig;
use crate::error::{BatchRejection, RecordKind};

/// Open-ended, insertion-ordered attribute map attached to records.
pub type Attributes = Map<String, Value>;

/// Attribute key holding the opted-in wallet address.
pub const WALLET_ADDRESS_ATTR: &str = "wallet_address";

/// Attribute key flagging that the wallet owner opted in.
pub const WALLET_OPTED_IN_ATTR: &str = "wallet_opted_in";

/// A query record as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySubmission {
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub user_query: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub query_attributes: Option<Attributes>,
    #[serde(default)]
    pub query_response_id: Option<String>,
    #[serde(default)]
    pub query_response_hit_ids: Option<Vec<String>>,
}

/// An interaction event as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventSubmission {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub action_name: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub event_attributes: Option<Attributes>,
}

/// A validated, enriched query ready to be persisted.
///
/// `query_id` doubles as the store document key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub application: String,
    pub query_id: String,
    pub client_id: String,
    pub user_query: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_attributes: Option<Attributes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_response_hit_ids: Option<Vec<String>>,
}

/// A validated, enriched event ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub query_id: String,
    pub action_name: String,
    pub client_id: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_attributes: Option<Attributes>,
}

/// Queries and events submitted together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSubmission {
    #[serde(default)]
    pub queries: Vec<QuerySubmission>,
    #[serde(default)]
    pub events: Vec<EventSubmission>,
}

impl BatchSubmission {
    /// Creates a batch from its two record lists.
    pub fn new(queries: Vec<QuerySubmission>, events: Vec<EventSubmission>) -> Self {
        Self { queries, events }
    }

    /// Returns true if the batch carries no records at all.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty() && self.events.is_empty()
    }

    /// Every client id present in the batch, in submission order (queries first).
    pub fn client_ids(&self) -> impl Iterator<Item = &str> {
        self.queries
            .iter()
            .filter_map(|q| q.client_id.as_deref())
            .chain(self.events.iter().filter_map(|e| e.client_id.as_deref()))
    }

    /// Applies the structural limits a transport schema would enforce.
    ///
    /// Runs before any session lookup; a violation rejects the whole batch.
    pub fn check_limits(&self, config: &IngestConfig) -> Result<(), BatchRejection> {
        if self.queries.len() > config.max_batch_size {
            return Err(BatchRejection::TooManyRecords {
                kind: RecordKind::Query,
                count: self.queries.len(),
                max: config.max_batch_size,
            });
        }
        if self.events.len() > config.max_batch_size {
            return Err(BatchRejection::TooManyRecords {
                kind: RecordKind::Event,
                count: self.events.len(),
                max: config.max_batch_size,
            });
        }

        for (index, query) in self.queries.iter().enumerate() {
            let reject = |reason: String| BatchRejection::InvalidRecord {
                kind: RecordKind::Query,
                index,
                reason,
            };
            if let Some(text) = &query.user_query {
                let len = text.chars().count();
                if len > config.max_query_length {
                    return Err(reject(format!(
                        "user_query has {} characters, maximum is {}",
                        len, config.max_query_length
                    )));
                }
            }
            if let Some(hits) = &query.query_response_hit_ids
                && hits.len() > config.max_hit_ids
            {
                return Err(reject(format!(
                    "query_response_hit_ids has {} entries, maximum is {}",
                    hits.len(),
                    config.max_hit_ids
                )));
            }
            if let Some(ts) = &query.timestamp {
                check_timestamp(ts).map_err(reject)?;
            }
        }

        for (index, event) in self.events.iter().enumerate() {
            let reject = |reason: String| BatchRejection::InvalidRecord {
                kind: RecordKind::Event,
                index,
                reason,
            };
            if let Some(action) = &event.action_name {
                let len = action.chars().count();
                if len > config.max_action_name_length {
                    return Err(reject(format!(
                        "action_name has {} characters, maximum is {}",
                        len, config.max_action_name_length
                    )));
                }
            }
            if let Some(ts) = &event.timestamp {
                check_timestamp(ts).map_err(reject)?;
            }
        }

        Ok(())
    }
}

/// Accepts RFC 3339 timestamps, which always carry an explicit zone.
fn check_timestamp(ts: &str) -> Result<(), String> {
    DateTime::parse_from_rfc3339(ts)
        .map(|_| ())
        .map_err(|e| format!("timestamp '{}' is not RFC 3339 with a zone: {}", ts, e))
}

/// Current UTC instant formatted as ISO-8601 with a `Z` suffix.
pub fn utc_timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query(text: &str) -> QuerySubmission {
        QuerySubmission {
            application: Some("graphql-images".to_string()),
            query_id: Some("q1".to_string()),
            client_id: Some("web@1.0.0@11111111-1111-1111-1111-111111111111".to_string()),
            user_query: Some(text.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_batch_deserializes_with_missing_arrays() {
        let batch: BatchSubmission = serde_json::from_value(json!({})).unwrap();
        assert!(batch.is_empty());

        let batch: BatchSubmission = serde_json::from_value(json!({
            "events": [{"query_id": "q1", "action_name": "click"}]
        }))
        .unwrap();
        assert!(batch.queries.is_empty());
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].client_id, None);
    }

    #[test]
    fn test_client_ids_skip_absent_values() {
        let mut batch = BatchSubmission::new(vec![query("a"), QuerySubmission::default()], vec![]);
        batch.events.push(EventSubmission {
            client_id: Some("x@y@z".to_string()),
            ..Default::default()
        });
        let ids: Vec<&str> = batch.client_ids().collect();
        assert_eq!(
            ids,
            vec!["web@1.0.0@11111111-1111-1111-1111-111111111111", "x@y@z"]
        );
    }

    #[test]
    fn test_check_limits_batch_size() {
        let config = IngestConfig::for_testing();
        let batch = BatchSubmission::new(vec![query("a"); config.max_batch_size], vec![]);
        assert!(batch.check_limits(&config).is_ok());

        let batch = BatchSubmission::new(vec![query("a"); config.max_batch_size + 1], vec![]);
        assert_eq!(
            batch.check_limits(&config),
            Err(BatchRejection::TooManyRecords {
                kind: RecordKind::Query,
                count: config.max_batch_size + 1,
                max: config.max_batch_size,
            })
        );
    }

    #[test]
    fn test_check_limits_query_length() {
        let config = IngestConfig::for_testing();
        let long = "x".repeat(config.max_query_length + 1);
        let batch = BatchSubmission::new(vec![query("ok"), query(&long)], vec![]);
        match batch.check_limits(&config) {
            Err(BatchRejection::InvalidRecord { kind, index, .. }) => {
                assert_eq!(kind, RecordKind::Query);
                assert_eq!(index, 1);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_check_limits_timestamps() {
        let config = IngestConfig::for_testing();
        let mut q = query("a");
        q.timestamp = Some("2024-05-01T10:00:00Z".to_string());
        let mut e = EventSubmission {
            timestamp: Some("2024-05-01T10:00:00+02:00".to_string()),
            ..Default::default()
        };
        let batch = BatchSubmission::new(vec![q.clone()], vec![e.clone()]);
        assert!(batch.check_limits(&config).is_ok());

        e.timestamp = Some("2024-05-01T10:00:00".to_string());
        let batch = BatchSubmission::new(vec![q], vec![e]);
        assert!(matches!(
            batch.check_limits(&config),
            Err(BatchRejection::InvalidRecord {
                kind: RecordKind::Event,
                index: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_query_record_skips_empty_optionals() {
        let record = QueryRecord {
            application: "graphql-images".to_string(),
            query_id: "q1".to_string(),
            client_id: "c".to_string(),
            user_query: "test".to_string(),
            timestamp: "2024-05-01T10:00:00Z".to_string(),
            query_attributes: None,
            query_response_id: None,
            query_response_hit_ids: None,
        };
        let doc = serde_json::to_value(&record).unwrap();
        assert!(doc.get("query_attributes").is_none());
        assert_eq!(doc["query_id"], "q1");
    }

    #[test]
    fn test_utc_timestamp_now_is_z_suffixed() {
        let ts = utc_timestamp_now();
        assert!(ts.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
