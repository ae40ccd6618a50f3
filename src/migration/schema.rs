// ABOUTME: Relational schema export model
// ABOUTME: Serialises to {table: {columns, primary_keys, indexes}} JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name
    pub name: String,
    /// Declared data type as reported by the catalog
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether NULL is allowed
    pub nullable: bool,
}

impl ColumnSchema {
    /// Build a column description
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
        }
    }
}

/// Columns, primary keys and indexes of one table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in ordinal order
    pub columns: Vec<ColumnSchema>,
    /// Primary key columns in key order
    pub primary_keys: Vec<String>,
    /// One `{index_name: definition}` entry per index
    pub indexes: Vec<BTreeMap<String, String>>,
}

/// Schema of every table in the source, keyed by table name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaExport {
    /// Table name → schema
    pub tables: BTreeMap<String, TableSchema>,
}

impl SchemaExport {
    /// Schema of one table
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    /// Pretty-printed JSON
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails
    pub fn to_json_pretty(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the pretty-printed JSON to `path`, replacing any existing file
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the file cannot be written
    pub fn write_to(&self, path: &Path) -> AppResult<()> {
        let json = self.to_json_pretty()?;
        std::fs::write(path, json)
            .map_err(|e| AppError::internal(format!("Failed to write {}: {e}", path.display())))
    }
}
