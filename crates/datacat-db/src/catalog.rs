//! PostgreSQL metadata catalog.
//!
//! A profile is written as one transaction: upsert the table row keyed by
//! `(schema_name, table_name)`, delete its previous columns, insert the new
//! ones. A failure anywhere rolls the whole write back, so readers never see
//! a table whose columns belong to two different runs.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use datacat_core::{
    logging, CatalogRepository, ColumnMetadata, ColumnProfile, DatasetProfile, Error, Result,
    TableMetadata, TableProfile,
};

const TABLE_COLUMNS: &str = "id, schema_name, table_name, table_type::text AS table_type, \
     description, row_count, size_bytes, created_at, updated_at, last_analyzed";

const COLUMN_COLUMNS: &str = "id, table_id, column_name, ordinal_position, \
     column_type::text AS column_type, is_nullable, null_count, unique_count, \
     min_value, max_value, avg_value, created_at, updated_at";

/// PostgreSQL implementation of [`CatalogRepository`].
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: Pool<Postgres>,
}

impl PgCatalogRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert or update the table row and return its id.
    ///
    /// An existing row keeps its id and `created_at`; row count, size,
    /// `last_analyzed` and `updated_at` are refreshed.
    pub async fn upsert_table(
        tx: &mut Transaction<'_, Postgres>,
        profile: &TableProfile,
    ) -> Result<Uuid> {
        let now = Utc::now();
        let row = sqlx::query(
            "INSERT INTO catalog.table_metadata
                 (id, schema_name, table_name, table_type, row_count, size_bytes,
                  created_at, updated_at, last_analyzed)
             VALUES ($1, $2, $3, $4::catalog.table_type, $5, $6, $7, $7, $8)
             ON CONFLICT (schema_name, table_name) DO UPDATE SET
                 row_count = EXCLUDED.row_count,
                 size_bytes = EXCLUDED.size_bytes,
                 last_analyzed = EXCLUDED.last_analyzed,
                 updated_at = EXCLUDED.updated_at
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(&profile.schema_name)
        .bind(&profile.table_name)
        .bind(profile.table_kind.as_str())
        .bind(profile.row_count)
        .bind(profile.size_bytes)
        .bind(now)
        .bind(profile.last_analyzed)
        .fetch_one(&mut **tx)
        .await
        .map_err(Error::Database)?;

        Ok(row.get("id"))
    }

    /// Replace every column row of `table_id` with `columns`.
    pub async fn replace_columns(
        tx: &mut Transaction<'_, Postgres>,
        table_id: Uuid,
        columns: &[ColumnProfile],
    ) -> Result<()> {
        sqlx::query("DELETE FROM catalog.column_metadata WHERE table_id = $1")
            .bind(table_id)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;

        let now = Utc::now();
        for column in columns {
            sqlx::query(
                "INSERT INTO catalog.column_metadata
                     (id, table_id, column_name, ordinal_position, column_type, is_nullable,
                      null_count, unique_count, min_value, max_value, avg_value,
                      created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5::catalog.column_type, $6, $7, $8, $9, $10, $11,
                         $12, $12)",
            )
            .bind(Uuid::now_v7())
            .bind(table_id)
            .bind(&column.column_name)
            .bind(column.ordinal_position)
            .bind(column.column_type.as_str())
            .bind(column.is_nullable)
            .bind(column.null_count)
            .bind(column.unique_count)
            .bind(&column.min_value)
            .bind(&column.max_value)
            .bind(column.avg_value)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(Error::Database)?;
        }
        Ok(())
    }

    fn parse_table_row(row: &PgRow) -> Result<TableMetadata> {
        let table_type: String = row.get("table_type");
        Ok(TableMetadata {
            id: row.get("id"),
            schema_name: row.get("schema_name"),
            table_name: row.get("table_name"),
            table_kind: table_type.parse()?,
            description: row.get("description"),
            row_count: row.get("row_count"),
            size_bytes: row.get("size_bytes"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            last_analyzed: row.get("last_analyzed"),
        })
    }

    fn parse_column_row(row: &PgRow) -> Result<ColumnMetadata> {
        let column_type: String = row.get("column_type");
        Ok(ColumnMetadata {
            id: row.get("id"),
            table_id: row.get("table_id"),
            column_name: row.get("column_name"),
            ordinal_position: row.get("ordinal_position"),
            column_type: column_type.parse()?,
            is_nullable: row.get("is_nullable"),
            null_count: row.get("null_count"),
            unique_count: row.get("unique_count"),
            min_value: row.get("min_value"),
            max_value: row.get("max_value"),
            avg_value: row.get("avg_value"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn store_profile(&self, profile: &TableProfile) -> Result<Uuid> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let table_id = Self::upsert_table(&mut tx, profile).await?;
        Self::replace_columns(&mut tx, table_id, &profile.columns).await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = logging::SUBSYSTEM_DB,
            component = logging::COMPONENT_CATALOG,
            op = "store_profile",
            table_id = %table_id,
            schema_name = %profile.schema_name,
            table_name = %profile.table_name,
            column_count = profile.columns.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Stored dataset profile"
        );
        Ok(table_id)
    }

    async fn get_profile(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Option<DatasetProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM catalog.table_metadata WHERE schema_name = $1 AND table_name = $2",
            TABLE_COLUMNS
        ))
        .bind(schema_name)
        .bind(table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let table = Self::parse_table_row(&row)?;

        let column_rows = sqlx::query(&format!(
            "SELECT {} FROM catalog.column_metadata WHERE table_id = $1 ORDER BY ordinal_position",
            COLUMN_COLUMNS
        ))
        .bind(table.id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let columns = column_rows
            .iter()
            .map(Self::parse_column_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(DatasetProfile { table, columns }))
    }

    async fn list_tables(&self, schema_name: Option<&str>) -> Result<Vec<TableMetadata>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM catalog.table_metadata
             WHERE ($1::text IS NULL OR schema_name = $1)
             ORDER BY schema_name, table_name",
            TABLE_COLUMNS
        ))
        .bind(schema_name)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_table_row).collect()
    }

    async fn delete_table(&self, table_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM catalog.table_metadata WHERE id = $1")
            .bind(table_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = logging::COMPONENT_CATALOG,
            op = "delete_table",
            table_id = %table_id,
            rows_affected = result.rows_affected(),
            "Deleted catalog table"
        );
        Ok(result.rows_affected() > 0)
    }
}
