//! In-memory stand-ins for the persistence traits, with failure injection.
//!
//! Compiled for unit tests and, with the `testing` feature, for the
//! integration tests under `tests/`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::macros::datetime;
use uuid::Uuid;

use crate::application::repos::{
    FacetCacheCounts, FacetCacheEntry, FacetCacheRepo, RepoError, SchemaCacheCounts,
    SchemaCacheEntry, SchemaCacheRepo, SchemaRepo, UpsertFacetCacheEntry, UpsertSchemaCacheEntry,
};
use crate::domain::entities::SchemaRecord;
use crate::domain::types::FacetType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    MissingTable,
    Unavailable,
}

impl Failure {
    fn error(self, table: &str) -> RepoError {
        match self {
            Failure::MissingTable => RepoError::missing_table(table),
            Failure::Unavailable => RepoError::from_persistence("connection refused"),
        }
    }
}

#[derive(Default)]
pub struct FakeStore {
    schema_rows: Mutex<HashMap<(i64, String), SchemaCacheEntry>>,
    facet_rows: Mutex<HashMap<(i64, FacetType, String), FacetCacheEntry>>,
    schemas: Mutex<HashMap<i64, SchemaRecord>>,
    failure: Mutex<Option<Failure>>,
    table_present: Mutex<Option<bool>>,
    next_id: AtomicUsize,
    pub authoritative_reads: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, failure: Option<Failure>) {
        *self.failure.lock().expect("failure lock") = failure;
    }

    pub fn set_table_present(&self, present: bool) {
        *self.table_present.lock().expect("table lock") = Some(present);
    }

    pub fn insert_schema(&self, schema: SchemaRecord) {
        self.schemas
            .lock()
            .expect("schemas lock")
            .insert(schema.id, schema);
    }

    pub fn schema_row(&self, schema_id: i64, cache_key: &str) -> Option<SchemaCacheEntry> {
        self.schema_rows
            .lock()
            .expect("schema rows lock")
            .get(&(schema_id, cache_key.to_string()))
            .cloned()
    }

    pub fn put_raw_schema_row(&self, schema_id: i64, cache_key: &str, cache_data: &str) {
        let now = OffsetDateTime::now_utc();
        self.schema_rows.lock().expect("schema rows lock").insert(
            (schema_id, cache_key.to_string()),
            SchemaCacheEntry {
                id: self.next_id(),
                schema_id,
                cache_key: cache_key.to_string(),
                cache_data: cache_data.to_string(),
                created_at: now,
                updated_at: now,
                expires_at: None,
            },
        );
    }

    pub fn schema_row_count(&self) -> usize {
        self.schema_rows.lock().expect("schema rows lock").len()
    }

    pub fn facet_row_count(&self) -> usize {
        self.facet_rows.lock().expect("facet rows lock").len()
    }

    fn check(&self, table: &str) -> Result<(), RepoError> {
        match *self.failure.lock().expect("failure lock") {
            Some(failure) => Err(failure.error(table)),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) as i64 + 1
    }
}

pub fn schema(id: i64) -> SchemaRecord {
    let properties: Map<String, Value> = json!({
        "status": {"type": "string", "facetable": true},
        "title": {"type": "string"}
    })
    .as_object()
    .cloned()
    .unwrap_or_default();
    let configuration: Map<String, Value> = json!({"objectNameField": "title"})
        .as_object()
        .cloned()
        .unwrap_or_default();

    SchemaRecord {
        id,
        uuid: Uuid::new_v4(),
        title: format!("Schema {id}"),
        version: "1.0.0".to_string(),
        description: None,
        properties,
        configuration,
        required: vec!["title".to_string()],
        tags: vec![],
        register_id: Some(1),
        owner: None,
        organisation: None,
        created_at: datetime!(2025-01-01 00:00 UTC),
        updated_at: datetime!(2025-01-02 00:00 UTC),
    }
}

#[async_trait]
impl SchemaRepo for FakeStore {
    async fn find_schema(&self, id: i64) -> Result<SchemaRecord, RepoError> {
        self.authoritative_reads.fetch_add(1, Ordering::Relaxed);
        self.schemas
            .lock()
            .expect("schemas lock")
            .get(&id)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl SchemaCacheRepo for FakeStore {
    fn schema_cache_table(&self) -> &str {
        "schema_cache"
    }

    async fn schema_cache_table_exists(&self) -> Result<bool, RepoError> {
        Ok(self.table_present.lock().expect("table lock").unwrap_or(true))
    }

    async fn find_schema_entry(
        &self,
        schema_id: i64,
        cache_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<SchemaCacheEntry>, RepoError> {
        self.check("schema_cache")?;
        Ok(self
            .schema_row(schema_id, cache_key)
            .filter(|row| row.expires_at.is_none_or(|expires| expires > now)))
    }

    async fn upsert_schema_entry(&self, entry: &UpsertSchemaCacheEntry) -> Result<(), RepoError> {
        self.check("schema_cache")?;
        let id = self.next_id();
        let mut rows = self.schema_rows.lock().expect("schema rows lock");
        let key = (entry.schema_id, entry.cache_key.clone());
        let created_at = rows.get(&key).map_or(entry.now, |row| row.created_at);
        rows.insert(
            key,
            SchemaCacheEntry {
                id,
                schema_id: entry.schema_id,
                cache_key: entry.cache_key.clone(),
                cache_data: entry.cache_data.clone(),
                created_at,
                updated_at: entry.now,
                expires_at: entry.expires_at,
            },
        );
        Ok(())
    }

    async fn delete_schema_entries(&self, schema_id: i64) -> Result<u64, RepoError> {
        self.check("schema_cache")?;
        let mut rows = self.schema_rows.lock().expect("schema rows lock");
        let before = rows.len();
        rows.retain(|(id, _), _| *id != schema_id);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_all_schema_entries(&self) -> Result<u64, RepoError> {
        self.check("schema_cache")?;
        let mut rows = self.schema_rows.lock().expect("schema rows lock");
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }

    async fn delete_expired_schema_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        self.check("schema_cache")?;
        let mut rows = self.schema_rows.lock().expect("schema rows lock");
        let before = rows.len();
        rows.retain(|_, row| row.expires_at.is_none_or(|expires| expires >= now));
        Ok((before - rows.len()) as u64)
    }

    async fn schema_entry_counts(&self) -> Result<SchemaCacheCounts, RepoError> {
        self.check("schema_cache")?;
        let rows = self.schema_rows.lock().expect("schema rows lock");
        Ok(SchemaCacheCounts {
            total: rows.len() as u64,
            with_ttl: rows.values().filter(|row| row.expires_at.is_some()).count() as u64,
        })
    }
}

#[async_trait]
impl FacetCacheRepo for FakeStore {
    fn facet_cache_table(&self) -> &str {
        "facet_cache"
    }

    async fn facet_cache_table_exists(&self) -> Result<bool, RepoError> {
        Ok(self.table_present.lock().expect("table lock").unwrap_or(true))
    }

    async fn find_facet_entry(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<FacetCacheEntry>, RepoError> {
        self.check("facet_cache")?;
        Ok(self
            .facet_rows
            .lock()
            .expect("facet rows lock")
            .get(&(schema_id, facet_type, field_name.to_string()))
            .filter(|row| row.expires_at.is_none_or(|expires| expires > now))
            .cloned())
    }

    async fn upsert_facet_entry(&self, entry: &UpsertFacetCacheEntry) -> Result<(), RepoError> {
        self.check("facet_cache")?;
        let id = self.next_id();
        let mut rows = self.facet_rows.lock().expect("facet rows lock");
        let key = (entry.schema_id, entry.facet_type, entry.field_name.clone());
        let created_at = rows.get(&key).map_or(entry.now, |row| row.created_at);
        rows.insert(
            key,
            FacetCacheEntry {
                id,
                schema_id: entry.schema_id,
                facet_type: entry.facet_type,
                field_name: entry.field_name.clone(),
                facet_config: entry.facet_config.clone(),
                cache_data: entry.cache_data.clone(),
                created_at,
                updated_at: entry.now,
                expires_at: entry.expires_at,
            },
        );
        Ok(())
    }

    async fn delete_facet_entries(&self, schema_id: i64) -> Result<u64, RepoError> {
        self.check("facet_cache")?;
        let mut rows = self.facet_rows.lock().expect("facet rows lock");
        let before = rows.len();
        rows.retain(|(id, _, _), _| *id != schema_id);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_facet_entries_of_types(&self, types: &[FacetType]) -> Result<u64, RepoError> {
        self.check("facet_cache")?;
        let mut rows = self.facet_rows.lock().expect("facet rows lock");
        let before = rows.len();
        rows.retain(|(_, facet_type, _), _| !types.contains(facet_type));
        Ok((before - rows.len()) as u64)
    }

    async fn delete_all_facet_entries(&self) -> Result<u64, RepoError> {
        self.check("facet_cache")?;
        let mut rows = self.facet_rows.lock().expect("facet rows lock");
        let removed = rows.len() as u64;
        rows.clear();
        Ok(removed)
    }

    async fn delete_expired_facet_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        self.check("facet_cache")?;
        let mut rows = self.facet_rows.lock().expect("facet rows lock");
        let before = rows.len();
        rows.retain(|_, row| row.expires_at.is_none_or(|expires| expires >= now));
        Ok((before - rows.len()) as u64)
    }

    async fn facet_entry_counts(&self) -> Result<FacetCacheCounts, RepoError> {
        self.check("facet_cache")?;
        let rows = self.facet_rows.lock().expect("facet rows lock");
        let mut counts = FacetCacheCounts {
            total: rows.len() as u64,
            ..Default::default()
        };
        for (_, facet_type, _) in rows.keys() {
            *counts.by_type.entry(*facet_type).or_default() += 1;
        }
        Ok(counts)
    }
}
