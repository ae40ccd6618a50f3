// ABOUTME: Scope guards for client sessions and transactions
// ABOUTME: Sessions end on drop; uncommitted transactions are aborted on drop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use mongodb::bson::{doc, Bson, Document};
use tracing::{debug, warn};

use crate::errors::{AppError, AppResult};
use crate::executor::prepare_operation;
use crate::operations::{Operation, OperationOutcome, UpdateSummary};
use crate::store::{DocumentSession, Namespace};

/// Client session bound to the scope that opened it
pub struct ScopedSession {
    session: Box<dyn DocumentSession>,
    database: String,
}

impl ScopedSession {
    pub(crate) fn new(session: Box<dyn DocumentSession>, database: &str) -> Self {
        Self {
            session,
            database: database.to_owned(),
        }
    }

    /// Execute a data verb in this session against the default database
    ///
    /// # Errors
    ///
    /// [`AppError::Operation`] wrapping the client failure
    pub async fn execute(&mut self, collection: &str, operation: Operation) -> AppResult<OperationOutcome> {
        run_in_session(self.session.as_mut(), &self.database, collection, operation).await
    }

    /// Insert one document and return its id
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn insert_one(&mut self, collection: &str, document: Document) -> AppResult<Bson> {
        self.execute(collection, Operation::InsertOne { document })
            .await?
            .into_inserted_id()
    }

    /// First document matching `filter`
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_one(&mut self, collection: &str, filter: Document) -> AppResult<Option<Document>> {
        self.execute(
            collection,
            Operation::FindOne {
                filter,
                projection: None,
            },
        )
        .await?
        .into_document()
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        debug!(database = %self.database, "Ended session");
    }
}

/// Transaction bound to the scope that opened it
///
/// Either [`commit`](Self::commit) or [`abort`](Self::abort) finishes it.
/// Dropping an unfinished transaction discards its writes.
pub struct ScopedTransaction {
    session: Box<dyn DocumentSession>,
    database: String,
    finished: bool,
}

impl ScopedTransaction {
    pub(crate) fn new(session: Box<dyn DocumentSession>, database: &str) -> Self {
        Self {
            session,
            database: database.to_owned(),
            finished: false,
        }
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.finished {
            return Err(AppError::invalid_input("transaction already finished"));
        }
        Ok(())
    }

    /// Execute a data verb inside the transaction
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidInput`] after commit or abort, otherwise
    /// [`AppError::Operation`] wrapping the client failure
    pub async fn execute(&mut self, collection: &str, operation: Operation) -> AppResult<OperationOutcome> {
        self.ensure_open()?;
        run_in_session(self.session.as_mut(), &self.database, collection, operation).await
    }

    /// Insert one document and return its id
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn insert_one(&mut self, collection: &str, document: Document) -> AppResult<Bson> {
        self.execute(collection, Operation::InsertOne { document })
            .await?
            .into_inserted_id()
    }

    /// Update the first match
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn update_one(
        &mut self,
        collection: &str,
        filter: Document,
        update: Document,
    ) -> AppResult<UpdateSummary> {
        self.execute(
            collection,
            Operation::UpdateOne {
                filter,
                update,
                upsert: false,
            },
        )
        .await?
        .into_update()
    }

    /// Delete the first match
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn delete_one(&mut self, collection: &str, filter: Document) -> AppResult<u64> {
        self.execute(collection, Operation::DeleteOne { filter })
            .await?
            .into_deleted()
    }

    /// First document matching `filter`, as seen by the transaction
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn find_one(&mut self, collection: &str, filter: Document) -> AppResult<Option<Document>> {
        self.execute(
            collection,
            Operation::FindOne {
                filter,
                projection: None,
            },
        )
        .await?
        .into_document()
    }

    /// Number of documents matching `filter`, as seen by the transaction
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute)
    pub async fn count(&mut self, collection: &str, filter: Option<Document>) -> AppResult<u64> {
        self.execute(
            collection,
            Operation::CountDocuments {
                filter: filter.unwrap_or_else(|| doc! {}),
                limit: None,
            },
        )
        .await?
        .into_count()
    }

    /// Make the transaction's writes visible
    ///
    /// # Errors
    ///
    /// Returns the client failure; the transaction is finished either way
    pub async fn commit(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.finished = true;
        self.session
            .commit_transaction()
            .await
            .map_err(|e| AppError::store("commit_transaction", e))?;
        debug!(database = %self.database, "Committed transaction");
        Ok(())
    }

    /// Discard the transaction's writes
    ///
    /// # Errors
    ///
    /// Returns the client failure; the transaction is finished either way
    pub async fn abort(&mut self) -> AppResult<()> {
        self.ensure_open()?;
        self.finished = true;
        self.session
            .abort_transaction()
            .await
            .map_err(|e| AppError::store("abort_transaction", e))?;
        debug!(database = %self.database, "Aborted transaction");
        Ok(())
    }
}

impl Drop for ScopedTransaction {
    fn drop(&mut self) {
        if !self.finished && self.session.in_transaction() {
            warn!(database = %self.database, "Transaction dropped without commit, aborting");
        }
    }
}

async fn run_in_session(
    session: &mut dyn DocumentSession,
    database: &str,
    collection: &str,
    operation: Operation,
) -> AppResult<OperationOutcome> {
    let operation = prepare_operation(operation);
    let verb = operation.kind().as_str();
    session
        .execute(&Namespace::new(database, collection), operation)
        .await
        .map_err(|e| AppError::operation(verb, collection, AppError::store(verb, e)))
}
