// ABOUTME: In-memory relational source for dry runs and tests
// ABOUTME: Tables with fixed rows, columns, keys and index definitions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::{ColumnSchema, RelationalSource, Row};
use crate::errors::{AppError, AppResult};

/// One table of a [`MemorySource`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    /// Table name
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<ColumnSchema>,
    /// Primary key columns
    pub primary_keys: Vec<String>,
    /// `(name, definition)` pairs
    pub indexes: Vec<(String, String)>,
    /// Rows in storage order
    pub rows: Vec<Row>,
}

impl MemoryTable {
    /// Empty table
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Add a column
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        self.columns.push(ColumnSchema::new(name, data_type, nullable));
        self
    }

    /// Add a primary key column
    #[must_use]
    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_keys.push(column.into());
        self
    }

    /// Add an index definition
    #[must_use]
    pub fn index(mut self, name: impl Into<String>, definition: impl Into<String>) -> Self {
        self.indexes.push((name.into(), definition.into()));
        self
    }

    /// Append a row
    #[must_use]
    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    /// Append several rows
    #[must_use]
    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.rows.extend(rows);
        self
    }
}

/// Relational source holding its tables in memory
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Vec<MemoryTable>,
    count_queries: AtomicU32,
    batch_queries: AtomicU32,
}

impl MemorySource {
    /// Source with no tables
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; tables are listed in insertion order
    #[must_use]
    pub fn table(mut self, table: MemoryTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Row count queries served
    #[must_use]
    pub fn count_queries(&self) -> u32 {
        self.count_queries.load(Ordering::Relaxed)
    }

    /// Batch queries served
    #[must_use]
    pub fn batch_queries(&self) -> u32 {
        self.batch_queries.load(Ordering::Relaxed)
    }

    fn find(&self, name: &str) -> AppResult<&MemoryTable> {
        self.tables
            .iter()
            .find(|table| table.name == name)
            .ok_or_else(|| AppError::relational(format!("relation \"{name}\" does not exist")))
    }
}

#[async_trait]
impl RelationalSource for MemorySource {
    fn describe(&self) -> String {
        format!("memory ({} tables)", self.tables.len())
    }

    async fn list_tables(&self) -> AppResult<Vec<String>> {
        Ok(self.tables.iter().map(|table| table.name.clone()).collect())
    }

    async fn row_count(&self, table: &str) -> AppResult<u64> {
        self.count_queries.fetch_add(1, Ordering::Relaxed);
        Ok(self.find(table)?.rows.len() as u64)
    }

    async fn fetch_batch(&self, table: &str, offset: u64, limit: u64) -> AppResult<Vec<Row>> {
        self.batch_queries.fetch_add(1, Ordering::Relaxed);
        let rows = &self.find(table)?.rows;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(rows.len());
        let end = start
            .saturating_add(usize::try_from(limit).unwrap_or(usize::MAX))
            .min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    async fn columns(&self, table: &str) -> AppResult<Vec<ColumnSchema>> {
        Ok(self.find(table)?.columns.clone())
    }

    async fn primary_keys(&self, table: &str) -> AppResult<Vec<String>> {
        Ok(self.find(table)?.primary_keys.clone())
    }

    async fn indexes(&self, table: &str) -> AppResult<Vec<(String, String)>> {
        Ok(self.find(table)?.indexes.clone())
    }
}
