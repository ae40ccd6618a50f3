// ABOUTME: Document-store client boundary for docbridge
// ABOUTME: Traits for clients, sessions and connectors with MongoDB and in-memory backends
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! Client boundary
//!
//! Everything above this module talks to the document store through three
//! traits:
//!
//! - [`Connector`] builds a client from a URI and [`ClientSettings`]
//! - [`DocumentClient`] runs commands and data verbs and opens sessions
//! - [`DocumentSession`] runs data verbs inside an optional transaction
//!
//! The [`mongo`] backend forwards to the official driver. The [`memory`]
//! backend keeps everything in process and is used by tests and dry runs.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::Document;
use serde::{Deserialize, Serialize};

use crate::config::{ClientSettings, ReadPreference, WriteConcernSetting};
use crate::errors::StoreResult;
use crate::operations::{Operation, OperationOutcome};

/// In-process document store
pub mod memory;
/// Official `MongoDB` driver backend
pub mod mongo;

pub use memory::{Fault, FaultTarget, MemoryConnector, MemoryServer};
pub use mongo::MongoConnector;

/// `database.collection` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
}

impl Namespace {
    /// Build a namespace
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Index definition
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    /// Key pattern, e.g. `{username: 1}`
    pub keys: Document,
    /// Reject duplicate keys
    pub unique: bool,
    /// Explicit name; derived from the keys when absent
    pub name: Option<String>,
}

impl IndexSpec {
    /// Non-unique index on `keys`
    #[must_use]
    pub const fn new(keys: Document) -> Self {
        Self {
            keys,
            unique: false,
            name: None,
        }
    }

    /// Mark the index unique
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Index name, following the server convention `field_1_other_-1`
    #[must_use]
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.keys
                .iter()
                .map(|(field, direction)| format!("{field}_{direction}"))
                .collect::<Vec<_>>()
                .join("_")
        })
    }
}

/// Read isolation for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadConcernLevel {
    /// Node-local data
    Local,
    /// Majority-committed data
    Majority,
    /// Point-in-time snapshot
    Snapshot,
}

/// Options applied when a transaction starts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Read concern
    pub read_concern: Option<ReadConcernLevel>,
    /// Write concern
    pub write_concern: Option<WriteConcernSetting>,
    /// Read preference; transactions only read from the primary
    pub read_preference: Option<ReadPreference>,
}

/// Live client handle
///
/// Implementations are cheap to share behind an `Arc` and safe to use from
/// concurrent tasks.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Run a database command and return the server reply
    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document>;

    /// Execute a data verb against a collection
    async fn execute(
        &self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome>;

    /// Create an index and return its name
    async fn create_index(&self, namespace: &Namespace, index: IndexSpec) -> StoreResult<String>;

    /// Open a client session
    async fn start_session(&self, causal_consistency: bool)
        -> StoreResult<Box<dyn DocumentSession>>;

    /// Release client resources; later calls may fail
    fn shutdown(&self);
}

/// Client session; an open transaction is aborted when the session is dropped
#[async_trait]
pub trait DocumentSession: Send {
    /// Begin a transaction
    async fn start_transaction(&mut self, options: &TransactionOptions) -> StoreResult<()>;

    /// Commit the open transaction
    async fn commit_transaction(&mut self) -> StoreResult<()>;

    /// Abort the open transaction
    async fn abort_transaction(&mut self) -> StoreResult<()>;

    /// Execute a data verb bound to this session
    async fn execute(
        &mut self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome>;

    /// Whether a transaction is open
    fn in_transaction(&self) -> bool;
}

/// Builds clients from connection parameters
#[async_trait]
pub trait Connector: Send + Sync {
    /// Create a client; connection establishment may be lazy
    async fn connect(
        &self,
        uri: &str,
        settings: &ClientSettings,
    ) -> StoreResult<Arc<dyn DocumentClient>>;
}
