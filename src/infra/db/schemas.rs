use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{RepoError, SchemaRepo},
    domain::entities::SchemaRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct SchemaRow {
    id: i64,
    uuid: Uuid,
    title: String,
    version: String,
    description: Option<String>,
    properties: Json<Value>,
    configuration: Json<Value>,
    required: Vec<String>,
    tags: Vec<String>,
    register_id: Option<i64>,
    owner: Option<String>,
    organisation: Option<String>,
    created: OffsetDateTime,
    updated: OffsetDateTime,
}

impl TryFrom<SchemaRow> for SchemaRecord {
    type Error = RepoError;

    fn try_from(row: SchemaRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            uuid: row.uuid,
            title: row.title,
            version: row.version,
            description: row.description,
            properties: json_object(row.properties.0, "properties")?,
            configuration: json_object(row.configuration.0, "configuration")?,
            required: row.required,
            tags: row.tags,
            register_id: row.register_id,
            owner: row.owner,
            organisation: row.organisation,
            created_at: row.created,
            updated_at: row.updated,
        })
    }
}

fn json_object(value: Value, column: &str) -> Result<Map<String, Value>, RepoError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(RepoError::Integrity {
            message: format!("schema column `{column}` holds {other} instead of an object"),
        }),
    }
}

#[async_trait]
impl SchemaRepo for PostgresRepositories {
    async fn find_schema(&self, id: i64) -> Result<SchemaRecord, RepoError> {
        let row = sqlx::query_as::<_, SchemaRow>(
            r#"
            SELECT id, uuid, title, version, description, properties, configuration,
                   required, tags, register_id, owner, organisation, created, updated
            FROM schemas
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        SchemaRecord::try_from(row)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_json_column_becomes_empty_object() {
        let map = json_object(Value::Null, "configuration").expect("null is accepted");
        assert!(map.is_empty());
    }

    #[test]
    fn non_object_json_column_is_an_integrity_error() {
        let err = json_object(json!([1, 2]), "properties").expect_err("array is rejected");
        assert!(matches!(err, RepoError::Integrity { .. }));
    }
}
