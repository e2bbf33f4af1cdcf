//! Submission fixtures.

use serde_json::{Value, json};

use sonar_ingest::types::Attributes;
use sonar_ingest::{BatchSubmission, EventSubmission, QuerySubmission};

/// A session the harness registers as live.
pub const LIVE_SESSION: &str = "11111111-1111-1111-1111-111111111111";

/// A session that is never registered.
pub const UNKNOWN_SESSION: &str = "22222222-2222-2222-2222-222222222222";

/// An allow-listed application.
pub const APPLICATION: &str = "graphql-images";

/// Wallet address used by enrichment tests.
pub const WALLET: &str = "abc123xyz789";

/// Builds a well-formed client identifier for a session.
pub fn client_id(session_id: &str) -> String {
    format!("{}@1.0.0@{}", APPLICATION, session_id)
}

/// A valid query for the given session.
pub fn query(query_id: &str, session_id: &str) -> QuerySubmission {
    QuerySubmission {
        application: Some(APPLICATION.to_string()),
        query_id: Some(query_id.to_string()),
        client_id: Some(client_id(session_id)),
        user_query: Some("mountain lake at dusk".to_string()),
        query_response_id: Some(format!("{}-response", query_id)),
        query_response_hit_ids: Some(vec!["img-1".to_string(), "img-2".to_string()]),
        ..Default::default()
    }
}

/// A valid click event for the given session.
pub fn event(query_id: &str, session_id: &str) -> EventSubmission {
    EventSubmission {
        query_id: Some(query_id.to_string()),
        action_name: Some("click".to_string()),
        client_id: Some(client_id(session_id)),
        message_type: Some("CLICK_THROUGH".to_string()),
        message: Some("opened result".to_string()),
        ..Default::default()
    }
}

/// Object and position attributes as a results page reports them.
pub fn event_attributes() -> Attributes {
    let value = json!({
        "object": { "object_id": "img-2", "object_id_field": "image_id" },
        "position": { "ordinal": 2 }
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// One query and one event for the given session.
pub fn single_pair(session_id: &str) -> BatchSubmission {
    let mut e = event("q-1", session_id);
    e.event_attributes = Some(event_attributes());
    BatchSubmission::new(vec![query("q-1", session_id)], vec![e])
}

/// `n` queries with distinct ids for the given session.
pub fn queries(n: usize, session_id: &str) -> Vec<QuerySubmission> {
    (0..n)
        .map(|i| query(&format!("q-{:03}", i), session_id))
        .collect()
}
