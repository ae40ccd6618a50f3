// ABOUTME: Retry-aware execution of data verbs against named collections
// ABOUTME: Stamps creation/update timestamps, normalises updates and translates every failure uniformly
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! # Operation executor
//!
//! [`OperationExecutor::execute`] is the single entry point every data verb
//! goes through:
//!
//! 1. the operation is prepared: inserts get `_created_at`, updates without
//!    operators are wrapped in `$set` and get `$set._updated_at`
//! 2. the collection handle is obtained from the manager (liveness-checked)
//! 3. the verb runs under the retry policy
//! 4. the outcome is recorded in the manager's history
//!
//! Any failure surfaces as [`AppError::Operation`] naming the verb and the
//! collection. Retry exhaustion keeps its attempt count inside.

use std::fmt;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::Stream;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use tracing::{debug, error};

use crate::constants::fields;
use crate::errors::{AppError, AppResult};
use crate::manager::ConnectionManager;
use crate::models::{OperationRecord, OperationStatus};
use crate::operations::{
    BulkWriteSummary, FindOptions, Operation, OperationKind, OperationOutcome, UpdateSummary,
    WriteModel,
};
use crate::retry::RetryPolicy;
use crate::store::IndexSpec;

/// Collection name with an optional database override
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    /// Collection name
    pub name: String,
    /// Database; the manager default when absent
    pub database: Option<String>,
}

impl CollectionRef {
    /// Collection in the default database
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: None,
        }
    }

    /// Collection in an explicit database
    pub fn in_database(database: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: Some(database.into()),
        }
    }
}

impl From<&str> for CollectionRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for CollectionRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{database}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Executes data verbs through a [`ConnectionManager`]
#[derive(Debug, Clone)]
pub struct OperationExecutor {
    manager: Arc<ConnectionManager>,
    policy: RetryPolicy,
}

impl OperationExecutor {
    /// Executor using the manager's retry policy
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let policy = manager.retry_policy().clone();
        Self { manager, policy }
    }

    /// Replace the retry policy for data verbs
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Underlying manager
    #[must_use]
    pub const fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Execute `operation` against `collection`
    ///
    /// # Errors
    ///
    /// [`AppError::Operation`] wrapping the classified failure
    pub async fn execute(
        &self,
        collection: &CollectionRef,
        operation: Operation,
    ) -> AppResult<OperationOutcome> {
        let operation = prepare_operation(operation);
        let verb = operation.kind().as_str();
        let namespace = self
            .manager
            .namespace(&collection.name, collection.database.as_deref());
        let database = collection.database.as_deref();
        let operation = &operation;

        let mut attempts = 0;
        let result = self
            .policy
            .run(verb, |attempt| {
                attempts = attempt;
                async move {
                    let handle = self.manager.collection(&collection.name, database).await?;
                    handle
                        .execute(operation.clone())
                        .await
                        .map_err(|e| AppError::store(verb, e))
                }
            })
            .await;

        let status = if result.is_ok() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        self.manager.record_operation(OperationRecord::now(
            verb,
            namespace.to_string(),
            status,
            attempts,
        ));

        result.map_err(|e| {
            error!(verb, namespace = %namespace, attempts, error = %e, "Operation failed");
            AppError::operation(verb, &collection.name, e)
        })
    }

    /// Execute a verb given by name
    ///
    /// # Errors
    ///
    /// [`AppError::UnsupportedOperation`] when `verb` is unknown or does not
    /// match `operation`
    pub async fn execute_named(
        &self,
        verb: &str,
        collection: &CollectionRef,
        operation: Operation,
    ) -> AppResult<OperationOutcome> {
        let kind: OperationKind = verb.parse()?;
        if kind != operation.kind() {
            return Err(AppError::UnsupportedOperation(format!(
                "{verb} does not accept {} arguments",
                operation.kind()
            )));
        }
        self.execute(collection, operation).await
    }

    /// Insert one document and return its id
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn insert_one(
        &self,
        collection: impl Into<CollectionRef>,
        document: Document,
    ) -> AppResult<Bson> {
        self.execute(&collection.into(), Operation::InsertOne { document })
            .await?
            .into_inserted_id()
    }

    /// Insert several documents in order and return their ids
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn insert_many(
        &self,
        collection: impl Into<CollectionRef>,
        documents: Vec<Document>,
    ) -> AppResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }
        self.execute(
            &collection.into(),
            Operation::InsertMany {
                documents,
                ordered: true,
            },
        )
        .await?
        .into_inserted_ids()
    }

    /// First document matching `filter`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_one(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        projection: Option<Document>,
    ) -> AppResult<Option<Document>> {
        self.execute(&collection.into(), Operation::FindOne { filter, projection })
            .await?
            .into_document()
    }

    /// Document by `_id`; a 24-digit hex id is matched as an `ObjectId`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_by_id(
        &self,
        collection: impl Into<CollectionRef>,
        id: &str,
    ) -> AppResult<Option<Document>> {
        let id = ObjectId::parse_str(id).map_or_else(|_| Bson::String(id.to_owned()), Bson::ObjectId);
        self.find_one(collection, doc! { "_id": id }, None).await
    }

    /// Every document matching `filter`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_many(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        options: FindOptions,
    ) -> AppResult<Vec<Document>> {
        self.execute(&collection.into(), Operation::FindMany { filter, options })
            .await?
            .into_documents()
    }

    /// Lazily page through the documents matching `filter`
    ///
    /// Pages are ordered by `_id` and fetched one at a time, each through the
    /// retry policy. Every call starts from the first page.
    pub fn find_batched<'a>(
        &'a self,
        collection: CollectionRef,
        filter: Document,
        batch_size: usize,
    ) -> impl Stream<Item = AppResult<Vec<Document>>> + Send + 'a {
        let batch_size = batch_size.max(1);
        try_stream! {
            let mut skip: u64 = 0;
            loop {
                let options = FindOptions {
                    projection: None,
                    sort: Some(doc! { "_id": 1 }),
                    skip: Some(skip),
                    limit: Some(batch_size as i64),
                };
                let page = self
                    .execute(&collection, Operation::FindMany { filter: filter.clone(), options })
                    .await?
                    .into_documents()?;
                let fetched = page.len();
                if fetched == 0 {
                    break;
                }
                debug!(collection = %collection, skip, fetched, "Fetched page");
                skip += fetched as u64;
                yield page;
                if fetched < batch_size {
                    break;
                }
            }
        }
    }

    /// Update the first match and return it, before or after the change
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_one_and_update(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        update: Document,
        return_after: bool,
    ) -> AppResult<Option<Document>> {
        self.execute(
            &collection.into(),
            Operation::FindOneAndUpdate {
                filter,
                update,
                upsert: false,
                return_after,
            },
        )
        .await?
        .into_document()
    }

    /// Update the first match
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn update_one(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> AppResult<UpdateSummary> {
        self.execute(
            &collection.into(),
            Operation::UpdateOne {
                filter,
                update,
                upsert,
            },
        )
        .await?
        .into_update()
    }

    /// Update every match
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn update_many(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> AppResult<UpdateSummary> {
        self.execute(
            &collection.into(),
            Operation::UpdateMany {
                filter,
                update,
                upsert,
            },
        )
        .await?
        .into_update()
    }

    /// Delete the first match and return the number deleted
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn delete_one(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
    ) -> AppResult<u64> {
        self.execute(&collection.into(), Operation::DeleteOne { filter })
            .await?
            .into_deleted()
    }

    /// Delete every match and return the number deleted
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn delete_many(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
    ) -> AppResult<u64> {
        self.execute(&collection.into(), Operation::DeleteMany { filter })
            .await?
            .into_deleted()
    }

    /// Run an aggregation pipeline
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn aggregate(
        &self,
        collection: impl Into<CollectionRef>,
        pipeline: Vec<Document>,
    ) -> AppResult<Vec<Document>> {
        self.execute(&collection.into(), Operation::Aggregate { pipeline })
            .await?
            .into_documents()
    }

    /// Apply several write models
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn bulk_write(
        &self,
        collection: impl Into<CollectionRef>,
        models: Vec<WriteModel>,
        ordered: bool,
    ) -> AppResult<BulkWriteSummary> {
        self.execute(&collection.into(), Operation::BulkWrite { models, ordered })
            .await?
            .into_bulk()
    }

    /// Number of documents matching `filter`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn count_documents(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
        limit: Option<u64>,
    ) -> AppResult<u64> {
        self.execute(&collection.into(), Operation::CountDocuments { filter, limit })
            .await?
            .into_count()
    }

    /// Whether any document matches `filter`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn exists(
        &self,
        collection: impl Into<CollectionRef>,
        filter: Document,
    ) -> AppResult<bool> {
        Ok(self.count_documents(collection, filter, Some(1)).await? > 0)
    }

    /// Create an index and return its name
    ///
    /// # Errors
    ///
    /// [`AppError::Operation`] wrapping the classified failure
    pub async fn create_index(
        &self,
        collection: impl Into<CollectionRef>,
        index: IndexSpec,
    ) -> AppResult<String> {
        let collection: &CollectionRef = &collection.into();
        let database = collection.database.as_deref();
        let index = &index;
        self.policy
            .run("create_index", |_| async move {
                let handle = self.manager.collection(&collection.name, database).await?;
                handle
                    .create_index(index.clone())
                    .await
                    .map_err(|e| AppError::store("create_index", e))
            })
            .await
            .map_err(|e| AppError::operation("create_index", &collection.name, e))
    }
}

/// Apply timestamp stamping and update normalisation
pub(crate) fn prepare_operation(operation: Operation) -> Operation {
    match operation {
        Operation::InsertOne { document } => Operation::InsertOne {
            document: stamp_created(document),
        },
        Operation::InsertMany { documents, ordered } => {
            let now = DateTime::now();
            Operation::InsertMany {
                documents: documents
                    .into_iter()
                    .map(|document| stamp_created_at(document, now))
                    .collect(),
                ordered,
            }
        }
        Operation::UpdateOne {
            filter,
            update,
            upsert,
        } => Operation::UpdateOne {
            filter,
            update: normalize_update(update),
            upsert,
        },
        Operation::UpdateMany {
            filter,
            update,
            upsert,
        } => Operation::UpdateMany {
            filter,
            update: normalize_update(update),
            upsert,
        },
        Operation::FindOneAndUpdate {
            filter,
            update,
            upsert,
            return_after,
        } => Operation::FindOneAndUpdate {
            filter,
            update: normalize_update(update),
            upsert,
            return_after,
        },
        Operation::BulkWrite { models, ordered } => Operation::BulkWrite {
            models: models.into_iter().map(prepare_model).collect(),
            ordered,
        },
        other => other,
    }
}

fn prepare_model(model: WriteModel) -> WriteModel {
    match model {
        WriteModel::InsertOne { document } => WriteModel::InsertOne {
            document: stamp_created(document),
        },
        WriteModel::UpdateOne {
            filter,
            update,
            upsert,
        } => WriteModel::UpdateOne {
            filter,
            update: normalize_update(update),
            upsert,
        },
        WriteModel::UpdateMany {
            filter,
            update,
            upsert,
        } => WriteModel::UpdateMany {
            filter,
            update: normalize_update(update),
            upsert,
        },
        other => other,
    }
}

fn stamp_created(document: Document) -> Document {
    stamp_created_at(document, DateTime::now())
}

fn stamp_created_at(mut document: Document, now: DateTime) -> Document {
    if !document.contains_key(fields::CREATED_AT) {
        document.insert(fields::CREATED_AT, now);
    }
    document
}

/// Wrap an operator-less update in `$set` and stamp `$set._updated_at`
///
/// Updates that use operators but no `$set` are left untouched.
#[must_use]
pub fn normalize_update(update: Document) -> Document {
    let mut update = if update.keys().all(|key| !key.starts_with('$')) {
        doc! { "$set": update }
    } else {
        update
    };
    if let Ok(set) = update.get_document_mut("$set") {
        if !set.contains_key(fields::UPDATED_AT) {
            set.insert(fields::UPDATED_AT, DateTime::now());
        }
    }
    update
}
