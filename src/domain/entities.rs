//! Domain entities mirrored from persistent storage.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Authoritative schema definition as stored by the register application.
///
/// The cache never owns these records; it only keeps projections of them.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaRecord {
    pub id: i64,
    pub uuid: Uuid,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub properties: Map<String, Value>,
    pub configuration: Map<String, Value>,
    pub required: Vec<String>,
    pub tags: Vec<String>,
    pub register_id: Option<i64>,
    pub owner: Option<String>,
    pub organisation: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
