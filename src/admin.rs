// ABOUTME: Thin administrative command wrappers over the connection manager
// ABOUTME: Database and collection listing, drops, server and storage statistics, index creation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::sync::Arc;

use mongodb::bson::{doc, Bson, Document};
use tracing::{info, warn};

use crate::constants::connection::ADMIN_DATABASE;
use crate::errors::{AppError, AppResult};
use crate::manager::ConnectionManager;
use crate::store::IndexSpec;

/// Administrative commands; each forwards one server command
#[derive(Debug, Clone)]
pub struct AdminOps {
    manager: Arc<ConnectionManager>,
}

impl AdminOps {
    /// Wrap a manager
    #[must_use]
    pub const fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Names of all non-empty databases
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn list_databases(&self) -> AppResult<Vec<String>> {
        let reply = self
            .manager
            .run_command(Some(ADMIN_DATABASE), doc! { "listDatabases": 1 })
            .await?;
        names_in(reply.get_array("databases"), "listDatabases")
    }

    /// Collection names in `database`, or the default database
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn list_collections(&self, database: Option<&str>) -> AppResult<Vec<String>> {
        let reply = self
            .manager
            .run_command(database, doc! { "listCollections": 1, "nameOnly": true })
            .await?;
        let batch = reply
            .get_document("cursor")
            .and_then(|cursor| cursor.get_array("firstBatch"));
        names_in(batch, "listCollections")
    }

    /// Drop a collection; dropping a missing collection is not an error
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn drop_collection(&self, name: &str, database: Option<&str>) -> AppResult<()> {
        self.manager
            .run_command(database, doc! { "drop": name })
            .await?;
        warn!(collection = %name, "Dropped collection");
        Ok(())
    }

    /// Drop a whole database
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn drop_database(&self, database: &str) -> AppResult<()> {
        self.manager
            .run_command(Some(database), doc! { "dropDatabase": 1 })
            .await?;
        warn!(database = %database, "Dropped database");
        Ok(())
    }

    /// Raw `serverStatus` reply
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn server_status(&self) -> AppResult<Document> {
        self.manager
            .run_command(Some(ADMIN_DATABASE), doc! { "serverStatus": 1 })
            .await
    }

    /// Raw `dbStats` reply
    ///
    /// # Errors
    ///
    /// Command failures
    pub async fn database_stats(&self, database: Option<&str>) -> AppResult<Document> {
        self.manager
            .run_command(database, doc! { "dbStats": 1 })
            .await
    }

    /// Raw `collStats` reply
    ///
    /// # Errors
    ///
    /// Command failures, including a missing collection
    pub async fn collection_stats(&self, name: &str, database: Option<&str>) -> AppResult<Document> {
        self.manager
            .run_command(database, doc! { "collStats": name })
            .await
    }

    /// Create an index and return its name
    ///
    /// # Errors
    ///
    /// Client or index build failures
    pub async fn create_index(
        &self,
        collection: &str,
        database: Option<&str>,
        index: IndexSpec,
    ) -> AppResult<String> {
        let handle = self.manager.collection(collection, database).await?;
        let name = handle
            .create_index(index)
            .await
            .map_err(|e| AppError::store("createIndexes", e))?;
        info!(namespace = %handle.namespace(), index = %name, "Created index");
        Ok(name)
    }
}

fn names_in(
    entries: Result<&Vec<Bson>, mongodb::bson::document::ValueAccessError>,
    command: &str,
) -> AppResult<Vec<String>> {
    let entries = entries
        .map_err(|e| AppError::serialization(format!("Malformed {command} reply: {e}")))?;
    Ok(entries
        .iter()
        .filter_map(|entry| match entry {
            Bson::Document(item) => item.get_str("name").ok().map(str::to_owned),
            _ => None,
        })
        .collect())
}
