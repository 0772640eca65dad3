//! Typed payloads stored in the `cache_data` column and the memory tiers.
//!
//! Every payload carries an `artifact` tag so a row read back under one key
//! can never be reinterpreted as another artifact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::SchemaRecord;
use crate::domain::types::FacetType;

use super::error::CacheError;

/// Read-only projection of a schema kept in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub id: i64,
    pub uuid: Uuid,
    pub title: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(default)]
    pub configuration: Map<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub register_id: Option<i64>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&SchemaRecord> for SchemaSnapshot {
    fn from(schema: &SchemaRecord) -> Self {
        Self {
            id: schema.id,
            uuid: schema.uuid,
            title: schema.title.clone(),
            version: schema.version.clone(),
            description: schema.description.clone(),
            properties: schema.properties.clone(),
            configuration: schema.configuration.clone(),
            required: schema.required.clone(),
            tags: schema.tags.clone(),
            register_id: schema.register_id,
            owner: schema.owner.clone(),
            organisation: schema.organisation.clone(),
            created_at: schema.created_at,
            updated_at: schema.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "artifact", rename_all = "snake_case")]
pub enum CachePayload {
    SchemaObject(SchemaSnapshot),
    Configuration {
        configuration: Map<String, Value>,
    },
    Properties {
        properties: Map<String, Value>,
    },
    FacetableFields {
        fields: Map<String, Value>,
    },
    FacetResult {
        facet_type: FacetType,
        field_name: String,
        data: Value,
    },
    Custom {
        name: String,
        value: Value,
    },
}

impl CachePayload {
    /// Tag written into the serialized payload.
    pub fn artifact(&self) -> &'static str {
        match self {
            CachePayload::SchemaObject(_) => "schema_object",
            CachePayload::Configuration { .. } => "configuration",
            CachePayload::Properties { .. } => "properties",
            CachePayload::FacetableFields { .. } => "facetable_fields",
            CachePayload::FacetResult { .. } => "facet_result",
            CachePayload::Custom { .. } => "custom",
        }
    }

    pub fn encode(&self) -> Result<String, CacheError> {
        serde_json::to_string(self).map_err(CacheError::from)
    }

    /// Decodes `raw` and checks that it carries the `expected` artifact tag.
    pub fn decode(key: &str, raw: &str, expected: &'static str) -> Result<Self, CacheError> {
        let payload: CachePayload =
            serde_json::from_str(raw).map_err(|err| CacheError::deserialization(key, err))?;
        if payload.artifact() != expected {
            return Err(CacheError::deserialization(
                key,
                format!(
                    "expected `{expected}` payload, found `{}`",
                    payload.artifact()
                ),
            ));
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use time::macros::datetime;

    use super::*;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot {
            id: 7,
            uuid: Uuid::nil(),
            title: "Publication".to_string(),
            version: "1.2.0".to_string(),
            description: None,
            properties: json!({"status": {"type": "string", "facetable": true}})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            configuration: Map::new(),
            required: vec!["status".to_string()],
            tags: vec![],
            register_id: Some(3),
            owner: None,
            organisation: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
            updated_at: datetime!(2025-02-01 12:30 UTC),
        }
    }

    #[test]
    fn payload_is_tagged_with_its_artifact() {
        let encoded = CachePayload::SchemaObject(snapshot())
            .encode()
            .expect("encode snapshot");
        let value: Value = serde_json::from_str(&encoded).expect("valid json");
        assert_eq!(value["artifact"], "schema_object");
        assert_eq!(value["title"], "Publication");
    }

    #[test]
    fn decode_restores_the_snapshot() {
        let payload = CachePayload::SchemaObject(snapshot());
        let encoded = payload.encode().expect("encode snapshot");
        let decoded =
            CachePayload::decode("schema_object_7", &encoded, "schema_object").expect("decode");
        assert_eq!(decoded, payload);
    }

    #[test]
    fn decode_rejects_mismatched_tag() {
        let encoded = CachePayload::Properties {
            properties: Map::new(),
        }
        .encode()
        .expect("encode properties");
        let err = CachePayload::decode("configuration_7", &encoded, "configuration")
            .expect_err("tag mismatch");
        assert!(matches!(err, CacheError::Deserialization { .. }));
    }

    #[test]
    fn decode_rejects_untagged_blobs() {
        let err = CachePayload::decode("schema_object_7", r#"{"title":"x"}"#, "schema_object")
            .expect_err("missing tag");
        assert!(matches!(err, CacheError::Deserialization { .. }));

        let err = CachePayload::decode("schema_object_7", "not json", "schema_object")
            .expect_err("garbage");
        assert!(err.to_string().contains("schema_object_7"));
    }
}
