use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        FacetCacheCounts, FacetCacheEntry, FacetCacheRepo, RepoError, SchemaCacheCounts,
        SchemaCacheEntry, SchemaCacheRepo, UpsertFacetCacheEntry, UpsertSchemaCacheEntry,
    },
    domain::types::FacetType,
};

use super::{PostgresRepositories, map_sqlx_error, util::convert_count};

pub const SCHEMA_CACHE_TABLE: &str = "schema_cache";
pub const FACET_CACHE_TABLE: &str = "facet_cache";

#[derive(sqlx::FromRow)]
struct SchemaCacheRow {
    id: i64,
    schema_id: i64,
    cache_key: String,
    cache_data: String,
    created: OffsetDateTime,
    updated: OffsetDateTime,
    expires: Option<OffsetDateTime>,
}

impl From<SchemaCacheRow> for SchemaCacheEntry {
    fn from(row: SchemaCacheRow) -> Self {
        Self {
            id: row.id,
            schema_id: row.schema_id,
            cache_key: row.cache_key,
            cache_data: row.cache_data,
            created_at: row.created,
            updated_at: row.updated,
            expires_at: row.expires,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FacetCacheRow {
    id: i64,
    schema_id: i64,
    facet_type: String,
    field_name: String,
    facet_config: Option<String>,
    cache_data: String,
    created: OffsetDateTime,
    updated: OffsetDateTime,
    expires: Option<OffsetDateTime>,
}

impl TryFrom<FacetCacheRow> for FacetCacheEntry {
    type Error = RepoError;

    fn try_from(row: FacetCacheRow) -> Result<Self, Self::Error> {
        let facet_type = parse_facet_type(&row.facet_type)?;
        Ok(Self {
            id: row.id,
            schema_id: row.schema_id,
            facet_type,
            field_name: row.field_name,
            facet_config: row.facet_config,
            cache_data: row.cache_data,
            created_at: row.created,
            updated_at: row.updated,
            expires_at: row.expires,
        })
    }
}

fn parse_facet_type(value: &str) -> Result<FacetType, RepoError> {
    FacetType::parse(value).ok_or_else(|| RepoError::Integrity {
        message: format!("unknown facet type `{value}`"),
    })
}

#[async_trait]
impl SchemaCacheRepo for PostgresRepositories {
    fn schema_cache_table(&self) -> &str {
        SCHEMA_CACHE_TABLE
    }

    async fn schema_cache_table_exists(&self) -> Result<bool, RepoError> {
        self.table_exists(SCHEMA_CACHE_TABLE).await
    }

    async fn find_schema_entry(
        &self,
        schema_id: i64,
        cache_key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<SchemaCacheEntry>, RepoError> {
        let row = sqlx::query_as::<_, SchemaCacheRow>(
            r#"
            SELECT id, schema_id, cache_key, cache_data, created, updated, expires
            FROM schema_cache
            WHERE schema_id = $1
              AND cache_key = $2
              AND (expires IS NULL OR expires > $3)
            "#,
        )
        .bind(schema_id)
        .bind(cache_key)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SchemaCacheEntry::from))
    }

    async fn upsert_schema_entry(&self, entry: &UpsertSchemaCacheEntry) -> Result<(), RepoError> {
        let updated = sqlx::query(
            r#"
            UPDATE schema_cache
            SET cache_data = $3, updated = $4, expires = $5
            WHERE schema_id = $1 AND cache_key = $2
            "#,
        )
        .bind(entry.schema_id)
        .bind(&entry.cache_key)
        .bind(&entry.cache_data)
        .bind(entry.now)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        // A concurrent writer may insert between the update and this statement.
        sqlx::query(
            r#"
            INSERT INTO schema_cache (schema_id, cache_key, cache_data, created, updated, expires)
            VALUES ($1, $2, $3, $4, $4, $5)
            ON CONFLICT (schema_id, cache_key) DO UPDATE
            SET cache_data = EXCLUDED.cache_data,
                updated = EXCLUDED.updated,
                expires = EXCLUDED.expires
            "#,
        )
        .bind(entry.schema_id)
        .bind(&entry.cache_key)
        .bind(&entry.cache_data)
        .bind(entry.now)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_schema_entries(&self, schema_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM schema_cache WHERE schema_id = $1")
            .bind(schema_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_all_schema_entries(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM schema_cache")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_schema_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM schema_cache WHERE expires IS NOT NULL AND expires < $1")
                .bind(now)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn schema_entry_counts(&self) -> Result<SchemaCacheCounts, RepoError> {
        let (total, with_ttl) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(expires) FROM schema_cache",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(SchemaCacheCounts {
            total: convert_count(total)?,
            with_ttl: convert_count(with_ttl)?,
        })
    }
}

#[async_trait]
impl FacetCacheRepo for PostgresRepositories {
    fn facet_cache_table(&self) -> &str {
        FACET_CACHE_TABLE
    }

    async fn facet_cache_table_exists(&self) -> Result<bool, RepoError> {
        self.table_exists(FACET_CACHE_TABLE).await
    }

    async fn find_facet_entry(
        &self,
        schema_id: i64,
        facet_type: FacetType,
        field_name: &str,
        now: OffsetDateTime,
    ) -> Result<Option<FacetCacheEntry>, RepoError> {
        let row = sqlx::query_as::<_, FacetCacheRow>(
            r#"
            SELECT id, schema_id, facet_type, field_name, facet_config, cache_data,
                   created, updated, expires
            FROM facet_cache
            WHERE schema_id = $1
              AND facet_type = $2
              AND field_name = $3
              AND (expires IS NULL OR expires > $4)
            "#,
        )
        .bind(schema_id)
        .bind(facet_type.as_str())
        .bind(field_name)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(FacetCacheEntry::try_from).transpose()
    }

    async fn upsert_facet_entry(&self, entry: &UpsertFacetCacheEntry) -> Result<(), RepoError> {
        let updated = sqlx::query(
            r#"
            UPDATE facet_cache
            SET facet_config = $4, cache_data = $5, updated = $6, expires = $7
            WHERE schema_id = $1 AND facet_type = $2 AND field_name = $3
            "#,
        )
        .bind(entry.schema_id)
        .bind(entry.facet_type.as_str())
        .bind(&entry.field_name)
        .bind(entry.facet_config.as_deref())
        .bind(&entry.cache_data)
        .bind(entry.now)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO facet_cache
                (schema_id, facet_type, field_name, facet_config, cache_data, created, updated, expires)
            VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
            ON CONFLICT (schema_id, facet_type, field_name) DO UPDATE
            SET facet_config = EXCLUDED.facet_config,
                cache_data = EXCLUDED.cache_data,
                updated = EXCLUDED.updated,
                expires = EXCLUDED.expires
            "#,
        )
        .bind(entry.schema_id)
        .bind(entry.facet_type.as_str())
        .bind(&entry.field_name)
        .bind(entry.facet_config.as_deref())
        .bind(&entry.cache_data)
        .bind(entry.now)
        .bind(entry.expires_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete_facet_entries(&self, schema_id: i64) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM facet_cache WHERE schema_id = $1")
            .bind(schema_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_facet_entries_of_types(&self, types: &[FacetType]) -> Result<u64, RepoError> {
        let names: Vec<String> = types.iter().map(|kind| kind.as_str().to_string()).collect();
        let result = sqlx::query("DELETE FROM facet_cache WHERE facet_type = ANY($1)")
            .bind(names)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_all_facet_entries(&self) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM facet_cache")
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn delete_expired_facet_entries(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let result =
            sqlx::query("DELETE FROM facet_cache WHERE expires IS NOT NULL AND expires < $1")
                .bind(now)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn facet_entry_counts(&self) -> Result<FacetCacheCounts, RepoError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT facet_type, COUNT(*) FROM facet_cache GROUP BY facet_type",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut counts = FacetCacheCounts::default();
        for (facet_type, count) in rows {
            let count = convert_count(count)?;
            counts.total += count;
            counts
                .by_type
                .insert(parse_facet_type(&facet_type)?, count);
        }
        Ok(counts)
    }
}
