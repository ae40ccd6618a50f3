// ABOUTME: PostgreSQL relational source for the migration pipeline
// ABOUTME: information_schema / pg_indexes introspection and ctid-ordered paging over sqlx
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Decode, Postgres, Row as _, Type, TypeInfo};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ColumnSchema, RelationalSource, Row, SqlValue};
use crate::config::RelationalConfig;
use crate::errors::{AppError, AppResult};

/// Read-only `PostgreSQL` source scanning one schema
pub struct PostgresSource {
    pool: PgPool,
    schema: String,
    target: String,
}

impl PostgresSource {
    /// Open a pool for `config`
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid parameters or a relational
    /// error when the server cannot be reached
    pub async fn connect(config: &RelationalConfig) -> AppResult<Self> {
        config.validate()?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(true)
            .connect(&config.connection_url())
            .await
            .map_err(|e| {
                AppError::relational(format!(
                    "Failed to connect to PostgreSQL at {}: {e}",
                    config.target()
                ))
            })?;
        info!(
            "PostgreSQL source connected: {} (schema {})",
            config.target(),
            config.schema
        );
        Ok(Self {
            pool,
            schema: config.schema.clone(),
            target: config.target(),
        })
    }

    /// Source over an existing pool
    #[must_use]
    pub fn from_pool(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            target: "postgres".to_owned(),
        }
    }

    /// Close the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Catalog `udt_name`s read in their native form
const NATIVE_TYPES: [&str; 27] = [
    "bool", "int2", "int4", "int8", "float4", "float8", "numeric", "bytea", "timestamptz",
    "timestamp", "date", "time", "uuid", "json", "jsonb", "text", "varchar", "bpchar", "name",
    "_bool", "_int4", "_int8", "_float8", "_numeric", "_text", "_varchar", "_uuid",
];

/// Whether a column of catalog type `udt_name` is decoded natively; every
/// other type (enums, intervals, network and range types, ...) is read as text
#[must_use]
pub fn decodes_natively(udt_name: &str) -> bool {
    NATIVE_TYPES.contains(&udt_name)
}

/// `SELECT` list for `(column, udt_name)` pairs in ordinal order
#[must_use]
pub fn select_list(columns: &[(String, String)]) -> String {
    if columns.is_empty() {
        return "*".to_owned();
    }
    columns
        .iter()
        .map(|(name, udt_name)| {
            let column = quote_ident(name);
            if decodes_natively(udt_name) {
                column
            } else {
                format!("{column}::text AS {column}")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_error(what: &str, table: &str, error: &sqlx::Error) -> AppError {
    AppError::relational(format!("Failed to read {what} of '{table}': {error}"))
}

#[async_trait]
impl RelationalSource for PostgresSource {
    fn describe(&self) -> String {
        format!("PostgreSQL {} (schema {})", self.target, self.schema)
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::relational(format!("Failed to list tables: {e}")))
    }

    async fn row_count(&self, table: &str) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.qualified(table)))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| query_error("row count", table, &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn fetch_batch(&self, table: &str, offset: u64, limit: u64) -> AppResult<Vec<Row>> {
        let column_types: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT column_name::text, udt_name::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            ",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("column types", table, &e))?;
        let sql = format!(
            "SELECT {} FROM {} ORDER BY ctid OFFSET $1 LIMIT $2",
            select_list(&column_types),
            self.qualified(table)
        );
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_error("rows", table, &e))?;
        debug!(table = %table, offset, fetched = rows.len(), "Fetched relational batch");
        rows.iter().map(decode_row).collect()
    }

    async fn columns(&self, table: &str) -> AppResult<Vec<ColumnSchema>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r"
            SELECT column_name::text, data_type::text, is_nullable::text
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            ",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("columns", table, &e))?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable)| ColumnSchema::new(name, data_type, nullable == "YES"))
            .collect())
    }

    async fn primary_keys(&self, table: &str) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r"
            SELECT kcu.column_name::text
            FROM information_schema.table_constraints AS tc
            JOIN information_schema.key_column_usage AS kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            ORDER BY kcu.ordinal_position
            ",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("primary keys", table, &e))
    }

    async fn indexes(&self, table: &str) -> AppResult<Vec<(String, String)>> {
        sqlx::query_as::<_, (String, String)>(
            r"
            SELECT indexname::text, indexdef
            FROM pg_indexes
            WHERE schemaname = $1 AND tablename = $2
            ORDER BY indexname
            ",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| query_error("indexes", table, &e))
    }
}

fn get<'r, T>(row: &'r PgRow, index: usize, column: &str) -> AppResult<Option<T>>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index)
        .map_err(|e| AppError::relational(format!("Failed to decode column '{column}': {e}")))
}

fn list<'r, T, F>(row: &'r PgRow, index: usize, column: &str, convert: F) -> AppResult<SqlValue>
where
    Vec<T>: Decode<'r, Postgres> + Type<Postgres>,
    F: Fn(T) -> SqlValue,
{
    Ok(get::<Vec<T>>(row, index, column)?.map_or(SqlValue::Null, |items| {
        SqlValue::Array(items.into_iter().map(convert).collect())
    }))
}

fn decode_row(row: &PgRow) -> AppResult<Row> {
    let mut decoded = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name();
        let value = decode_value(row, index, name, column.type_info().name())?;
        decoded.push(name, value);
    }
    Ok(decoded)
}

fn decode_value(row: &PgRow, index: usize, name: &str, type_name: &str) -> AppResult<SqlValue> {
    let value: SqlValue = match type_name {
        "BOOL" => get::<bool>(row, index, name)?.into(),
        "INT2" => get::<i16>(row, index, name)?.map(|v| SqlValue::Int(i64::from(v))).into(),
        "INT4" => get::<i32>(row, index, name)?.into(),
        "INT8" => get::<i64>(row, index, name)?.into(),
        "FLOAT4" => get::<f32>(row, index, name)?.map(|v| SqlValue::Float(f64::from(v))).into(),
        "FLOAT8" => get::<f64>(row, index, name)?.into(),
        "NUMERIC" => get::<Decimal>(row, index, name)?.into(),
        "BYTEA" => get::<Vec<u8>>(row, index, name)?.map(SqlValue::Bytes).into(),
        "TIMESTAMPTZ" => get::<DateTime<Utc>>(row, index, name)?.map(SqlValue::Timestamp).into(),
        "TIMESTAMP" => get::<NaiveDateTime>(row, index, name)?
            .map(|at| SqlValue::Timestamp(at.and_utc()))
            .into(),
        "DATE" => get::<NaiveDate>(row, index, name)?.map(|d| d.to_string()).into(),
        "TIME" => get::<NaiveTime>(row, index, name)?.map(|t| t.to_string()).into(),
        "UUID" => get::<Uuid>(row, index, name)?.map(SqlValue::Uuid).into(),
        "JSON" | "JSONB" => get::<JsonValue>(row, index, name)?.map(SqlValue::Json).into(),
        "BOOL[]" => list::<bool, _>(row, index, name, SqlValue::Bool)?,
        "INT4[]" => list::<i32, _>(row, index, name, SqlValue::from)?,
        "INT8[]" => list::<i64, _>(row, index, name, SqlValue::Int)?,
        "FLOAT8[]" => list::<f64, _>(row, index, name, SqlValue::Float)?,
        "NUMERIC[]" => list::<Decimal, _>(row, index, name, SqlValue::Decimal)?,
        "TEXT[]" | "VARCHAR[]" => list::<String, _>(row, index, name, SqlValue::Text)?,
        "UUID[]" => list::<Uuid, _>(row, index, name, SqlValue::Uuid)?,
        // Character types and columns selected as text
        _ => get::<String>(row, index, name)
            .map_err(|_| {
                AppError::relational(format!(
                    "Unsupported column type {type_name} for column '{name}'"
                ))
            })?
            .into(),
    };
    Ok(value)
}
