// ABOUTME: Relational row values and their conversion into documents
// ABOUTME: NUMERIC values become doubles, recursively through arrays and nested maps
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use chrono::{DateTime, Utc};
use mongodb::bson::{self, spec::BinarySubtype, Binary, Bson, Document};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// One relational column value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// BOOLEAN
    Bool(bool),
    /// Any integer width
    Int(i64),
    /// REAL / DOUBLE PRECISION
    Float(f64),
    /// NUMERIC
    Decimal(Decimal),
    /// Character data, and any type rendered as text
    Text(String),
    /// BYTEA
    Bytes(Vec<u8>),
    /// TIMESTAMP / TIMESTAMPTZ
    Timestamp(DateTime<Utc>),
    /// UUID
    Uuid(Uuid),
    /// JSON / JSONB
    Json(JsonValue),
    /// Array types
    Array(Vec<SqlValue>),
    /// Composite values, in column order
    Map(Vec<(String, SqlValue)>),
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// One relational row, columns in select order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    /// Empty row
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
        }
    }

    /// Append a column
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    /// Append a column in place
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((name.into(), value.into()));
    }

    /// Value of the named column
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Columns in order
    pub fn iter(&self) -> impl Iterator<Item = &(String, SqlValue)> {
        self.columns.iter()
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl From<Vec<(String, SqlValue)>> for Row {
    fn from(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }
}

impl IntoIterator for Row {
    type Item = (String, SqlValue);
    type IntoIter = std::vec::IntoIter<(String, SqlValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Replace every NUMERIC with a double, descending into arrays and maps
#[must_use]
pub fn convert_decimals(value: SqlValue) -> SqlValue {
    match value {
        SqlValue::Decimal(d) => SqlValue::Float(decimal_to_f64(d)),
        SqlValue::Array(items) => SqlValue::Array(items.into_iter().map(convert_decimals).collect()),
        SqlValue::Map(entries) => SqlValue::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key, convert_decimals(value)))
                .collect(),
        ),
        other => other,
    }
}

fn decimal_to_f64(value: Decimal) -> f64 {
    // Every NUMERIC that fits a Decimal has an f64 approximation
    value.to_f64().unwrap_or(f64::NAN)
}

/// Document for a row, with NUMERIC values converted to doubles
#[must_use]
pub fn row_to_document(row: Row) -> Document {
    row.into_iter()
        .map(|(name, value)| (name, to_bson(convert_decimals(value))))
        .collect()
}

/// BSON form of a converted value
#[must_use]
pub fn to_bson(value: SqlValue) -> Bson {
    match value {
        SqlValue::Null => Bson::Null,
        SqlValue::Bool(b) => Bson::Boolean(b),
        SqlValue::Int(i) => integer(i),
        SqlValue::Float(f) => Bson::Double(f),
        SqlValue::Decimal(d) => Bson::Double(decimal_to_f64(d)),
        SqlValue::Text(s) => Bson::String(s),
        SqlValue::Bytes(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes,
        }),
        SqlValue::Timestamp(at) => Bson::DateTime(bson::DateTime::from_millis(at.timestamp_millis())),
        SqlValue::Uuid(id) => Bson::String(id.hyphenated().to_string()),
        SqlValue::Json(json) => json_to_bson(json),
        SqlValue::Array(items) => Bson::Array(items.into_iter().map(to_bson).collect()),
        SqlValue::Map(entries) => Bson::Document(
            entries
                .into_iter()
                .map(|(key, value)| (key, to_bson(value)))
                .collect(),
        ),
    }
}

fn integer(value: i64) -> Bson {
    i32::try_from(value).map_or(Bson::Int64(value), Bson::Int32)
}

/// BSON form of a JSON value; integers keep their width, other numbers become
/// doubles
#[must_use]
pub fn json_to_bson(value: JsonValue) -> Bson {
    match value {
        JsonValue::Null => Bson::Null,
        JsonValue::Bool(b) => Bson::Boolean(b),
        JsonValue::Number(n) => n.as_i64().map_or_else(
            || Bson::Double(n.as_f64().unwrap_or(f64::NAN)),
            integer,
        ),
        JsonValue::String(s) => Bson::String(s),
        JsonValue::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        JsonValue::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(key, value)| (key, json_to_bson(value)))
                .collect(),
        ),
    }
}
