// ABOUTME: MongoDB backend of the client boundary built on the official async driver
// ABOUTME: Maps driver errors onto StoreError kinds so retry classification stays driver-agnostic
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{Bson, Document};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::{
    Acknowledgment as DriverAcknowledgment, ClientOptions, IndexOptions, ReadConcern,
    ReturnDocument, Tls, TlsOptions, WriteConcern,
};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tracing::debug;

use super::{
    Connector, DocumentClient, DocumentSession, IndexSpec, Namespace, ReadConcernLevel,
    TransactionOptions,
};
use crate::config::{Acknowledgment, ClientSettings, ReadPreference, WriteConcernSetting};
use crate::errors::{StoreError, StoreResult};
use crate::operations::{
    BulkWriteSummary, FindOptions, Operation, OperationOutcome, UpdateSummary, WriteModel,
};

/// Builds driver-backed clients
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    async fn connect(
        &self,
        uri: &str,
        settings: &ClientSettings,
    ) -> StoreResult<Arc<dyn DocumentClient>> {
        let mut options = ClientOptions::parse(uri).await.map_err(map_error)?;
        apply_settings(&mut options, settings);
        let client = Client::with_options(options).map_err(map_error)?;
        Ok(Arc::new(MongoClient { client }))
    }
}

// Read preference, replica set, app name and retry flags travel in the URI.
fn apply_settings(options: &mut ClientOptions, settings: &ClientSettings) {
    options.min_pool_size = Some(settings.min_pool_size);
    options.max_pool_size = Some(settings.max_pool_size);
    options.connect_timeout = Some(settings.connect_timeout);
    options.server_selection_timeout = Some(settings.server_selection_timeout);
    options.max_idle_time = Some(settings.max_idle_time);
    options.write_concern = Some(driver_write_concern(&settings.write_concern));
    if let Some(tls) = settings.tls {
        let mut tls_options = TlsOptions::default();
        tls_options.allow_invalid_certificates = Some(tls.allow_invalid_certificates);
        options.tls = Some(Tls::Enabled(tls_options));
    }
    // The driver has no per-socket timeout; connect and selection timeouts bound the wait.
    debug!(
        socket_timeout_ms = settings.socket_timeout.as_millis() as u64,
        "Socket timeout not applied by the driver"
    );
}

fn driver_write_concern(setting: &WriteConcernSetting) -> WriteConcern {
    let mut concern = WriteConcern::default();
    concern.w = Some(match &setting.w {
        Acknowledgment::Nodes(n) => DriverAcknowledgment::Nodes(*n),
        Acknowledgment::Majority => DriverAcknowledgment::Majority,
        Acknowledgment::Tag(tag) => DriverAcknowledgment::Custom(tag.clone()),
    });
    concern.journal = Some(setting.journal);
    concern
}

/// Map a driver error onto the boundary taxonomy
pub(crate) fn map_error(err: MongoError) -> StoreError {
    let message = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            StoreError::timeout(message)
        }
        ErrorKind::Io(_) | ErrorKind::ConnectionPoolCleared { .. } | ErrorKind::DnsResolve { .. } => {
            StoreError::network(message)
        }
        ErrorKind::ServerSelection { .. } => StoreError::server_selection(message),
        ErrorKind::Authentication { .. } => StoreError::authentication_failed(message),
        ErrorKind::InvalidArgument { .. } => StoreError::invalid_argument(message),
        ErrorKind::Command(command) => StoreError::from_code(command.code, message),
        ErrorKind::Write(WriteFailure::WriteError(write)) => {
            StoreError::from_code(write.code, message)
        }
        ErrorKind::Write(WriteFailure::WriteConcernError(concern)) => {
            StoreError::from_code(concern.code, message)
        }
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map_or_else(
                || StoreError::command(message.clone()),
                |first| StoreError::from_code(first.code, message.clone()),
            ),
        ErrorKind::BsonDeserialization(_) | ErrorKind::BsonSerialization(_) => {
            StoreError::serialization(message)
        }
        ErrorKind::Transaction { .. } => StoreError::transaction(message),
        _ if err.contains_label("RetryableWriteError") => StoreError::auto_reconnect(message),
        _ => StoreError::command(message),
    }
}

/// Driver-backed client
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    fn collection(&self, namespace: &Namespace) -> Collection<Document> {
        self.client
            .database(&namespace.database)
            .collection(&namespace.collection)
    }
}

#[async_trait]
impl DocumentClient for MongoClient {
    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document> {
        self.client
            .database(database)
            .run_command(command)
            .await
            .map_err(map_error)
    }

    async fn execute(
        &self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome> {
        run_operation(&self.collection(namespace), operation, None).await
    }

    async fn create_index(&self, namespace: &Namespace, index: IndexSpec) -> StoreResult<String> {
        let mut options = IndexOptions::default();
        options.unique = index.unique.then_some(true);
        options.name = index.name.clone();
        let mut model = IndexModel::default();
        model.keys = index.keys;
        model.options = Some(options);
        let created = self
            .collection(namespace)
            .create_index(model)
            .await
            .map_err(map_error)?;
        Ok(created.index_name)
    }

    async fn start_session(
        &self,
        causal_consistency: bool,
    ) -> StoreResult<Box<dyn DocumentSession>> {
        let session = self
            .client
            .start_session()
            .causal_consistency(causal_consistency)
            .await
            .map_err(map_error)?;
        Ok(Box::new(MongoSession {
            client: self.clone(),
            session,
            transaction_open: false,
        }))
    }

    // Driver resources are released when the last clone of the client drops.
    fn shutdown(&self) {
        debug!("Releasing MongoDB client handle");
    }
}

/// Driver session; the driver aborts an open transaction when it is dropped
pub struct MongoSession {
    client: MongoClient,
    session: ClientSession,
    transaction_open: bool,
}

#[async_trait]
impl DocumentSession for MongoSession {
    async fn start_transaction(&mut self, options: &TransactionOptions) -> StoreResult<()> {
        if options
            .read_preference
            .is_some_and(|pref| pref != ReadPreference::Primary)
        {
            return Err(StoreError::invalid_argument(
                "transactions must read from the primary",
            ));
        }
        let mut start = self.session.start_transaction();
        if let Some(level) = options.read_concern {
            start = start.read_concern(match level {
                ReadConcernLevel::Local => ReadConcern::local(),
                ReadConcernLevel::Majority => ReadConcern::majority(),
                ReadConcernLevel::Snapshot => ReadConcern::snapshot(),
            });
        }
        if let Some(concern) = &options.write_concern {
            start = start.write_concern(driver_write_concern(concern));
        }
        start.await.map_err(map_error)?;
        self.transaction_open = true;
        Ok(())
    }

    async fn commit_transaction(&mut self) -> StoreResult<()> {
        self.session.commit_transaction().await.map_err(map_error)?;
        self.transaction_open = false;
        Ok(())
    }

    async fn abort_transaction(&mut self) -> StoreResult<()> {
        self.transaction_open = false;
        self.session.abort_transaction().await.map_err(map_error)
    }

    async fn execute(
        &mut self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome> {
        let collection = self.client.collection(namespace);
        run_operation(&collection, operation, Some(&mut self.session)).await
    }

    fn in_transaction(&self) -> bool {
        self.transaction_open
    }
}

macro_rules! with_session {
    ($action:expr, $session:expr) => {
        match $session {
            Some(session) => $action.session(session).await,
            None => $action.await,
        }
    };
}

async fn run_operation(
    collection: &Collection<Document>,
    operation: Operation,
    mut session: Option<&mut ClientSession>,
) -> StoreResult<OperationOutcome> {
    let outcome = match operation {
        Operation::InsertOne { document } => {
            let result = with_session!(collection.insert_one(document), session);
            OperationOutcome::Inserted(result.map_err(map_error)?.inserted_id)
        }
        Operation::InsertMany { documents, ordered } => {
            let result = with_session!(collection.insert_many(documents).ordered(ordered), session)
                .map_err(map_error)?;
            let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
            ids.sort_by_key(|(index, _)| *index);
            OperationOutcome::InsertedMany(ids.into_iter().map(|(_, id)| id).collect())
        }
        Operation::FindOne { filter, projection } => {
            let mut action = collection.find_one(filter);
            if let Some(projection) = projection {
                action = action.projection(projection);
            }
            OperationOutcome::Document(with_session!(action, session).map_err(map_error)?)
        }
        Operation::FindMany { filter, options } => {
            OperationOutcome::Documents(find_many(collection, filter, options, session).await?)
        }
        Operation::UpdateOne {
            filter,
            update,
            upsert,
        } => {
            let result = with_session!(collection.update_one(filter, update).upsert(upsert), session)
                .map_err(map_error)?;
            OperationOutcome::Updated(UpdateSummary {
                matched: result.matched_count,
                modified: result.modified_count,
                upserted_id: result.upserted_id,
            })
        }
        Operation::UpdateMany {
            filter,
            update,
            upsert,
        } => {
            let result =
                with_session!(collection.update_many(filter, update).upsert(upsert), session)
                    .map_err(map_error)?;
            OperationOutcome::Updated(UpdateSummary {
                matched: result.matched_count,
                modified: result.modified_count,
                upserted_id: result.upserted_id,
            })
        }
        Operation::DeleteOne { filter } => {
            let result = with_session!(collection.delete_one(filter), session).map_err(map_error)?;
            OperationOutcome::Deleted(result.deleted_count)
        }
        Operation::DeleteMany { filter } => {
            let result = with_session!(collection.delete_many(filter), session).map_err(map_error)?;
            OperationOutcome::Deleted(result.deleted_count)
        }
        Operation::Aggregate { pipeline } => {
            let documents = if let Some(session) = session {
                let mut cursor = collection
                    .aggregate(pipeline)
                    .session(&mut *session)
                    .await
                    .map_err(map_error)?;
                let mut documents = Vec::new();
                while let Some(document) = cursor.next(session).await {
                    documents.push(document.map_err(map_error)?);
                }
                documents
            } else {
                collection
                    .aggregate(pipeline)
                    .await
                    .map_err(map_error)?
                    .try_collect()
                    .await
                    .map_err(map_error)?
            };
            OperationOutcome::Documents(documents)
        }
        Operation::BulkWrite { models, ordered } => {
            let mut summary = BulkWriteSummary::default();
            let mut first_error = None;
            for model in models {
                if let Err(e) =
                    apply_write_model(collection, model, session.as_deref_mut(), &mut summary)
                        .await
                {
                    if ordered {
                        return Err(e);
                    }
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
            OperationOutcome::BulkWritten(summary)
        }
        Operation::FindOneAndUpdate {
            filter,
            update,
            upsert,
            return_after,
        } => {
            let action = collection
                .find_one_and_update(filter, update)
                .upsert(upsert)
                .return_document(if return_after {
                    ReturnDocument::After
                } else {
                    ReturnDocument::Before
                });
            OperationOutcome::Document(with_session!(action, session).map_err(map_error)?)
        }
        Operation::CountDocuments { filter, limit } => {
            let mut action = collection.count_documents(filter);
            if let Some(limit) = limit {
                action = action.limit(limit);
            }
            OperationOutcome::Count(with_session!(action, session).map_err(map_error)?)
        }
    };
    Ok(outcome)
}

async fn find_many(
    collection: &Collection<Document>,
    filter: Document,
    options: FindOptions,
    session: Option<&mut ClientSession>,
) -> StoreResult<Vec<Document>> {
    let mut action = collection.find(filter);
    if let Some(projection) = options.projection {
        action = action.projection(projection);
    }
    if let Some(sort) = options.sort {
        action = action.sort(sort);
    }
    if let Some(skip) = options.skip {
        action = action.skip(skip);
    }
    if let Some(limit) = options.limit {
        action = action.limit(limit);
    }
    match session {
        Some(session) => {
            let mut cursor = action.session(&mut *session).await.map_err(map_error)?;
            let mut documents = Vec::new();
            while let Some(document) = cursor.next(session).await {
                documents.push(document.map_err(map_error)?);
            }
            Ok(documents)
        }
        None => action
            .await
            .map_err(map_error)?
            .try_collect()
            .await
            .map_err(map_error),
    }
}

// One round trip per model keeps the summary exact without the driver's
// cross-collection bulk API, which needs server 8.0.
async fn apply_write_model(
    collection: &Collection<Document>,
    model: WriteModel,
    session: Option<&mut ClientSession>,
    summary: &mut BulkWriteSummary,
) -> StoreResult<()> {
    match model {
        WriteModel::InsertOne { document } => {
            with_session!(collection.insert_one(document), session).map_err(map_error)?;
            summary.inserted += 1;
        }
        WriteModel::UpdateOne {
            filter,
            update,
            upsert,
        } => {
            let result = with_session!(collection.update_one(filter, update).upsert(upsert), session)
                .map_err(map_error)?;
            summary.matched += result.matched_count;
            summary.modified += result.modified_count;
            summary.upserted += u64::from(result.upserted_id.is_some());
        }
        WriteModel::UpdateMany {
            filter,
            update,
            upsert,
        } => {
            let result =
                with_session!(collection.update_many(filter, update).upsert(upsert), session)
                    .map_err(map_error)?;
            summary.matched += result.matched_count;
            summary.modified += result.modified_count;
            summary.upserted += u64::from(result.upserted_id.is_some());
        }
        WriteModel::DeleteOne { filter } => {
            let result = with_session!(collection.delete_one(filter), session).map_err(map_error)?;
            summary.deleted += result.deleted_count;
        }
        WriteModel::DeleteMany { filter } => {
            let result = with_session!(collection.delete_many(filter), session).map_err(map_error)?;
            summary.deleted += result.deleted_count;
        }
    }
    Ok(())
}
