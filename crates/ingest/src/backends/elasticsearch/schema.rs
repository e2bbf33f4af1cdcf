//! Index mappings for the query and event collections.
//!
//! Attribute maps are mapped as dynamic objects: their shape is up to the
//! client, apart from the wallet keys added during enrichment.

use elasticsearch::indices::{IndicesCreateParts, IndicesExistsParts};
use serde_json::{Value, json};

use crate::core::Collection;
use crate::error::{BackendError, BackendResult};

use super::backend::{BACKEND_NAME, ElasticsearchConfig, ElasticsearchStore};

fn index_settings(config: &ElasticsearchConfig) -> Value {
    json!({
        "number_of_shards": config.number_of_shards,
        "number_of_replicas": config.number_of_replicas,
        "refresh_interval": config.refresh_interval
    })
}

/// Creates the index body for query documents.
pub fn query_index_mapping(config: &ElasticsearchConfig) -> Value {
    json!({
        "settings": index_settings(config),
        "mappings": {
            "properties": {
                "application": { "type": "keyword" },
                "query_id": { "type": "keyword" },
                "client_id": { "type": "keyword" },
                "user_query": {
                    "type": "text",
                    "fields": {
                        "keyword": { "type": "keyword", "ignore_above": 256 }
                    }
                },
                "timestamp": { "type": "date", "format": "strict_date_optional_time" },
                "query_response_id": { "type": "keyword" },
                "query_response_hit_ids": { "type": "keyword" },
                "query_attributes": {
                    "type": "object",
                    "dynamic": true,
                    "properties": {
                        "wallet_address": { "type": "keyword" },
                        "wallet_opted_in": { "type": "boolean" }
                    }
                }
            }
        }
    })
}

/// Creates the index body for event documents.
pub fn event_index_mapping(config: &ElasticsearchConfig) -> Value {
    json!({
        "settings": index_settings(config),
        "mappings": {
            "properties": {
                "query_id": { "type": "keyword" },
                "action_name": { "type": "keyword" },
                "client_id": { "type": "keyword" },
                "timestamp": { "type": "date", "format": "strict_date_optional_time" },
                "message_type": { "type": "keyword" },
                "message": { "type": "text" },
                "event_attributes": {
                    "type": "object",
                    "dynamic": true,
                    "properties": {
                        "wallet_address": { "type": "keyword" },
                        "wallet_opted_in": { "type": "boolean" },
                        "object": {
                            "type": "object",
                            "dynamic": true,
                            "properties": {
                                "object_id": { "type": "keyword" },
                                "object_id_field": { "type": "keyword" },
                                "description": { "type": "text" }
                            }
                        },
                        "position": {
                            "type": "object",
                            "dynamic": true,
                            "properties": {
                                "ordinal": { "type": "integer" }
                            }
                        }
                    }
                }
            }
        }
    })
}

fn index_mapping(config: &ElasticsearchConfig, collection: Collection) -> Value {
    match collection {
        Collection::Queries => query_index_mapping(config),
        Collection::Events => event_index_mapping(config),
    }
}

/// Ensures the index for a collection exists, creating it if necessary.
pub async fn ensure_index(store: &ElasticsearchStore, collection: Collection) -> BackendResult<()> {
    let index = store.index_name(collection);

    let exists_response = store
        .client()
        .indices()
        .exists(IndicesExistsParts::Index(&[&index]))
        .send()
        .await
        .map_err(|e| {
            BackendError::internal(
                BACKEND_NAME,
                format!("Failed to check index existence: {}", e),
            )
        })?;

    if exists_response.status_code().is_success() {
        return Ok(());
    }

    let mapping = index_mapping(store.config(), collection);

    let response = store
        .client()
        .indices()
        .create(IndicesCreateParts::Index(&index))
        .body(mapping)
        .send()
        .await
        .map_err(|e| {
            BackendError::internal(
                BACKEND_NAME,
                format!("Failed to create index {}: {}", index, e),
            )
        })?;

    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Another instance created it first
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        return Err(BackendError::internal(
            BACKEND_NAME,
            format!(
                "Failed to create index {} (status {}): {}",
                index, status, body
            ),
        ));
    }

    tracing::info!("Created Elasticsearch index '{}'", index);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_mapping_structure() {
        let mapping = query_index_mapping(&ElasticsearchConfig::default());

        assert_eq!(mapping["settings"]["number_of_shards"], 1);
        assert_eq!(mapping["settings"]["refresh_interval"], "1s");

        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["query_id"]["type"], "keyword");
        assert_eq!(props["user_query"]["type"], "text");
        assert_eq!(props["timestamp"]["type"], "date");
        assert_eq!(
            props["query_attributes"]["properties"]["wallet_opted_in"]["type"],
            "boolean"
        );
    }

    #[test]
    fn test_event_mapping_structure() {
        let mapping = event_index_mapping(&ElasticsearchConfig::default());
        let props = &mapping["mappings"]["properties"];
        assert_eq!(props["action_name"]["type"], "keyword");
        assert_eq!(props["message"]["type"], "text");

        let attributes = &props["event_attributes"]["properties"];
        assert_eq!(attributes["wallet_address"]["type"], "keyword");
        assert_eq!(attributes["object"]["properties"]["object_id"]["type"], "keyword");
        assert_eq!(attributes["position"]["properties"]["ordinal"]["type"], "integer");
    }

    #[test]
    fn test_index_mapping_per_collection() {
        let config = ElasticsearchConfig::default();
        assert!(
            index_mapping(&config, Collection::Queries)["mappings"]["properties"]["user_query"]
                .is_object()
        );
        assert!(
            index_mapping(&config, Collection::Events)["mappings"]["properties"]["action_name"]
                .is_object()
        );
    }
}
