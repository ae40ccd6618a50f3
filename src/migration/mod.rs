// ABOUTME: Relational to document migration pipeline
// ABOUTME: Paged table transfer with progress reporting and relational schema export
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! # Migration
//!
//! [`MigrationPipeline::transfer_data`] copies every table of a
//! [`RelationalSource`] into a collection of the same name:
//!
//! - tables are visited in the order the source lists them
//! - each table's row count is read once, then rows are paged with
//!   offset/limit
//! - NUMERIC values are converted to doubles before insertion
//! - every page is written with one `insert_many`
//!
//! A failed page aborts the run; pages written before it stay in place.
//! Running the transfer twice inserts every row twice.

use std::collections::BTreeMap;

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::AppResult;
use crate::executor::{CollectionRef, OperationExecutor};

/// In-memory relational source
pub mod memory;
/// `PostgreSQL` source over sqlx
#[cfg(feature = "postgresql")]
pub mod postgres;
mod schema;
mod value;

pub use memory::{MemorySource, MemoryTable};
#[cfg(feature = "postgresql")]
pub use postgres::PostgresSource;
pub use schema::{ColumnSchema, SchemaExport, TableSchema};
pub use value::{convert_decimals, json_to_bson, row_to_document, to_bson, Row, SqlValue};

/// Read-only access to a relational database
#[async_trait]
pub trait RelationalSource: Send + Sync {
    /// Human readable location, used in logs
    fn describe(&self) -> String;

    /// Tables in catalog order
    async fn list_tables(&self) -> AppResult<Vec<String>>;

    /// Number of rows in `table`
    async fn row_count(&self, table: &str) -> AppResult<u64>;

    /// Up to `limit` rows of `table` starting at `offset`, in a stable order
    async fn fetch_batch(&self, table: &str, offset: u64, limit: u64) -> AppResult<Vec<Row>>;

    /// Columns of `table` in ordinal order
    async fn columns(&self, table: &str) -> AppResult<Vec<ColumnSchema>>;

    /// Primary key columns of `table`
    async fn primary_keys(&self, table: &str) -> AppResult<Vec<String>>;

    /// `(name, definition)` of every index on `table`
    async fn indexes(&self, table: &str) -> AppResult<Vec<(String, String)>>;
}

/// Rows moved for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableTransfer {
    /// Source table and target collection name
    pub table: String,
    /// Row count read before paging
    pub total_rows: u64,
    /// Rows inserted
    pub transferred: u64,
}

/// Summary of a completed transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReport {
    /// Per-table results in transfer order
    pub tables: Vec<TableTransfer>,
}

impl TransferReport {
    /// Rows inserted across all tables
    #[must_use]
    pub fn total_transferred(&self) -> u64 {
        self.tables.iter().map(|t| t.transferred).sum()
    }

    /// Result for one table
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableTransfer> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// Copies relational tables into document collections
pub struct MigrationPipeline<S> {
    source: S,
    executor: OperationExecutor,
    target_database: Option<String>,
    show_progress: bool,
}

impl<S: RelationalSource> MigrationPipeline<S> {
    /// Pipeline writing into the executor's default database, with progress
    /// bars enabled
    pub const fn new(source: S, executor: OperationExecutor) -> Self {
        Self {
            source,
            executor,
            target_database: None,
            show_progress: true,
        }
    }

    /// Write into `database` instead of the default one
    #[must_use]
    pub fn into_database(mut self, database: impl Into<String>) -> Self {
        self.target_database = Some(database.into());
        self
    }

    /// Toggle progress bars
    #[must_use]
    pub const fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// The relational source
    pub const fn source(&self) -> &S {
        &self.source
    }

    fn collection_for(&self, table: &str) -> CollectionRef {
        self.target_database.as_ref().map_or_else(
            || CollectionRef::new(table),
            |database| CollectionRef::in_database(database, table),
        )
    }

    /// Copy every table in pages of `batch_size` rows
    ///
    /// # Errors
    ///
    /// The first source or insert failure; earlier pages are not rolled back
    pub async fn transfer_data(&self, batch_size: usize) -> AppResult<TransferReport> {
        let batch_size = batch_size.max(1) as u64;
        info!("Starting data transfer from {}", self.source.describe());

        let tables = self.source.list_tables().await?;
        let progress = if self.show_progress {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let overall = progress.add(bounded_bar(tables.len() as u64, "tables"));
        overall.set_message("Tables processed");

        let mut report = TransferReport::default();
        for table in &tables {
            let transfer = self.transfer_table(&progress, table, batch_size).await?;
            report.tables.push(transfer);
            overall.inc(1);
        }
        overall.finish_with_message("Tables processed");

        info!(
            tables = report.tables.len(),
            rows = report.total_transferred(),
            "Data transfer complete"
        );
        Ok(report)
    }

    async fn transfer_table(
        &self,
        progress: &MultiProgress,
        table: &str,
        batch_size: u64,
    ) -> AppResult<TableTransfer> {
        let total_rows = self.source.row_count(table).await?;
        info!("Transferring table: {}, total rows: {}", table, total_rows);

        let bar = progress.add(bounded_bar(total_rows, "rows"));
        bar.set_message(format!("Transferring {table}"));
        let collection = self.collection_for(table);

        let mut offset = 0;
        let mut transferred = 0;
        while offset < total_rows {
            let rows = self.source.fetch_batch(table, offset, batch_size).await?;
            if rows.is_empty() {
                break;
            }
            let fetched = rows.len() as u64;
            let documents = rows.into_iter().map(row_to_document).collect();
            if let Err(e) = self
                .executor
                .insert_many(collection.clone(), documents)
                .await
            {
                error!(table = %table, offset, error = %e, "Error inserting documents");
                bar.abandon_with_message(format!("Failed {table}"));
                return Err(e);
            }
            info!("Inserted {} rows into {}", fetched, collection);
            transferred += fetched;
            offset += fetched;
            bar.inc(fetched);
        }
        bar.finish_with_message(format!("Transferred {table}"));

        Ok(TableTransfer {
            table: table.to_owned(),
            total_rows,
            transferred,
        })
    }

    /// Columns, primary keys and indexes of every table
    ///
    /// # Errors
    ///
    /// The first catalog query failure
    pub async fn schema(&self) -> AppResult<SchemaExport> {
        export_schema(&self.source).await
    }
}

/// Columns, primary keys and indexes of every table in `source`
///
/// # Errors
///
/// The first catalog query failure
pub async fn export_schema<S: RelationalSource + ?Sized>(source: &S) -> AppResult<SchemaExport> {
    let mut export = SchemaExport::default();
    for table in source.list_tables().await? {
        let schema = TableSchema {
            columns: source.columns(&table).await?,
            primary_keys: source.primary_keys(&table).await?,
            indexes: source
                .indexes(&table)
                .await?
                .into_iter()
                .map(|(name, definition)| BTreeMap::from([(name, definition)]))
                .collect(),
        };
        export.tables.insert(table, schema);
    }
    info!(tables = export.tables.len(), "Exported relational schema");
    Ok(export)
}

fn bounded_bar(len: u64, unit: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::with_template(&format!(
        "{{spinner:.green}} {{elapsed_precise}} [{{bar:30.cyan/blue}}] {{pos}}/{{len}} {unit} {{msg}}"
    )) {
        bar.set_style(style.progress_chars("=> "));
    }
    bar
}
