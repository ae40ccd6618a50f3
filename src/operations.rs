// ABOUTME: Closed set of data verbs accepted by the operation executor
// ABOUTME: Each verb carries its own arguments; outcomes are typed per verb
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::fmt;
use std::str::FromStr;

use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Name of a data verb
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Insert one document
    InsertOne,
    /// Insert several documents
    InsertMany,
    /// Return the first match
    FindOne,
    /// Return every match
    FindMany,
    /// Update the first match
    UpdateOne,
    /// Update every match
    UpdateMany,
    /// Delete the first match
    DeleteOne,
    /// Delete every match
    DeleteMany,
    /// Run an aggregation pipeline
    Aggregate,
    /// Apply a list of write models
    BulkWrite,
    /// Update the first match and return it
    FindOneAndUpdate,
    /// Count matches
    CountDocuments,
}

impl OperationKind {
    /// Every supported verb
    pub const ALL: [Self; 12] = [
        Self::InsertOne,
        Self::InsertMany,
        Self::FindOne,
        Self::FindMany,
        Self::UpdateOne,
        Self::UpdateMany,
        Self::DeleteOne,
        Self::DeleteMany,
        Self::Aggregate,
        Self::BulkWrite,
        Self::FindOneAndUpdate,
        Self::CountDocuments,
    ];

    /// Verb name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InsertOne => "insert_one",
            Self::InsertMany => "insert_many",
            Self::FindOne => "find_one",
            Self::FindMany => "find",
            Self::UpdateOne => "update_one",
            Self::UpdateMany => "update_many",
            Self::DeleteOne => "delete_one",
            Self::DeleteMany => "delete_many",
            Self::Aggregate => "aggregate",
            Self::BulkWrite => "bulk_write",
            Self::FindOneAndUpdate => "find_one_and_update",
            Self::CountDocuments => "count_documents",
        }
    }

    /// Whether the verb modifies data
    #[must_use]
    pub const fn is_write(self) -> bool {
        !matches!(
            self,
            Self::FindOne | Self::FindMany | Self::Aggregate | Self::CountDocuments
        )
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "find_many" {
            return Ok(Self::FindMany);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::UnsupportedOperation(s.to_owned()))
    }
}

/// Options for multi-document reads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Fields to include or exclude
    pub projection: Option<Document>,
    /// Sort specification
    pub sort: Option<Document>,
    /// Documents to skip
    pub skip: Option<u64>,
    /// Maximum documents returned
    pub limit: Option<i64>,
}

/// One entry of a bulk write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteModel {
    /// Insert a document
    InsertOne {
        /// Document to insert
        document: Document,
    },
    /// Update the first match
    UpdateOne {
        /// Match filter
        filter: Document,
        /// Update document
        update: Document,
        /// Insert when nothing matches
        upsert: bool,
    },
    /// Update every match
    UpdateMany {
        /// Match filter
        filter: Document,
        /// Update document
        update: Document,
        /// Insert when nothing matches
        upsert: bool,
    },
    /// Delete the first match
    DeleteOne {
        /// Match filter
        filter: Document,
    },
    /// Delete every match
    DeleteMany {
        /// Match filter
        filter: Document,
    },
}

/// A data verb with its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Insert one document
    InsertOne {
        /// Document to insert
        document: Document,
    },
    /// Insert several documents
    InsertMany {
        /// Documents to insert
        documents: Vec<Document>,
        /// Stop at the first failure
        ordered: bool,
    },
    /// First match
    FindOne {
        /// Match filter
        filter: Document,
        /// Projection
        projection: Option<Document>,
    },
    /// Every match
    FindMany {
        /// Match filter
        filter: Document,
        /// Read options
        options: FindOptions,
    },
    /// Update the first match
    UpdateOne {
        /// Match filter
        filter: Document,
        /// Update document
        update: Document,
        /// Insert when nothing matches
        upsert: bool,
    },
    /// Update every match
    UpdateMany {
        /// Match filter
        filter: Document,
        /// Update document
        update: Document,
        /// Insert when nothing matches
        upsert: bool,
    },
    /// Delete the first match
    DeleteOne {
        /// Match filter
        filter: Document,
    },
    /// Delete every match
    DeleteMany {
        /// Match filter
        filter: Document,
    },
    /// Aggregation pipeline
    Aggregate {
        /// Pipeline stages
        pipeline: Vec<Document>,
    },
    /// Bulk write
    BulkWrite {
        /// Write models
        models: Vec<WriteModel>,
        /// Stop at the first failure
        ordered: bool,
    },
    /// Update the first match and return it
    FindOneAndUpdate {
        /// Match filter
        filter: Document,
        /// Update document
        update: Document,
        /// Insert when nothing matches
        upsert: bool,
        /// Return the document after the update instead of before
        return_after: bool,
    },
    /// Count matches
    CountDocuments {
        /// Match filter
        filter: Document,
        /// Stop counting at this many
        limit: Option<u64>,
    },
}

impl Operation {
    /// Verb of this operation
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::InsertOne { .. } => OperationKind::InsertOne,
            Self::InsertMany { .. } => OperationKind::InsertMany,
            Self::FindOne { .. } => OperationKind::FindOne,
            Self::FindMany { .. } => OperationKind::FindMany,
            Self::UpdateOne { .. } => OperationKind::UpdateOne,
            Self::UpdateMany { .. } => OperationKind::UpdateMany,
            Self::DeleteOne { .. } => OperationKind::DeleteOne,
            Self::DeleteMany { .. } => OperationKind::DeleteMany,
            Self::Aggregate { .. } => OperationKind::Aggregate,
            Self::BulkWrite { .. } => OperationKind::BulkWrite,
            Self::FindOneAndUpdate { .. } => OperationKind::FindOneAndUpdate,
            Self::CountDocuments { .. } => OperationKind::CountDocuments,
        }
    }
}

/// Result counts of an update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    /// Documents matched
    pub matched: u64,
    /// Documents changed
    pub modified: u64,
    /// Id of an upserted document
    pub upserted_id: Option<Bson>,
}

/// Result counts of a bulk write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteSummary {
    /// Documents inserted
    pub inserted: u64,
    /// Documents matched by updates
    pub matched: u64,
    /// Documents changed by updates
    pub modified: u64,
    /// Documents deleted
    pub deleted: u64,
    /// Documents upserted
    pub upserted: u64,
}

/// Verb-specific result
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// Id of the inserted document
    Inserted(Bson),
    /// Ids of the inserted documents, in input order
    InsertedMany(Vec<Bson>),
    /// Single document read
    Document(Option<Document>),
    /// Multi-document read
    Documents(Vec<Document>),
    /// Update counts
    Updated(UpdateSummary),
    /// Deleted count
    Deleted(u64),
    /// Bulk write counts
    BulkWritten(BulkWriteSummary),
    /// Count result
    Count(u64),
}

impl OperationOutcome {
    const fn variant_name(&self) -> &'static str {
        match self {
            Self::Inserted(_) => "Inserted",
            Self::InsertedMany(_) => "InsertedMany",
            Self::Document(_) => "Document",
            Self::Documents(_) => "Documents",
            Self::Updated(_) => "Updated",
            Self::Deleted(_) => "Deleted",
            Self::BulkWritten(_) => "BulkWritten",
            Self::Count(_) => "Count",
        }
    }

    fn mismatch(&self, expected: &str) -> AppError {
        AppError::internal(format!(
            "expected {expected} outcome, got {}",
            self.variant_name()
        ))
    }

    /// Inserted id
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_inserted_id(self) -> AppResult<Bson> {
        match self {
            Self::Inserted(id) => Ok(id),
            other => Err(other.mismatch("Inserted")),
        }
    }

    /// Inserted ids
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_inserted_ids(self) -> AppResult<Vec<Bson>> {
        match self {
            Self::InsertedMany(ids) => Ok(ids),
            other => Err(other.mismatch("InsertedMany")),
        }
    }

    /// Single document
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_document(self) -> AppResult<Option<Document>> {
        match self {
            Self::Document(doc) => Ok(doc),
            other => Err(other.mismatch("Document")),
        }
    }

    /// Document list
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_documents(self) -> AppResult<Vec<Document>> {
        match self {
            Self::Documents(docs) => Ok(docs),
            other => Err(other.mismatch("Documents")),
        }
    }

    /// Update counts
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_update(self) -> AppResult<UpdateSummary> {
        match self {
            Self::Updated(summary) => Ok(summary),
            other => Err(other.mismatch("Updated")),
        }
    }

    /// Deleted count
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_deleted(self) -> AppResult<u64> {
        match self {
            Self::Deleted(n) => Ok(n),
            other => Err(other.mismatch("Deleted")),
        }
    }

    /// Bulk write counts
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_bulk(self) -> AppResult<BulkWriteSummary> {
        match self {
            Self::BulkWritten(summary) => Ok(summary),
            other => Err(other.mismatch("BulkWritten")),
        }
    }

    /// Count
    ///
    /// # Errors
    ///
    /// Internal error when the outcome is of another verb
    pub fn into_count(self) -> AppResult<u64> {
        match self {
            Self::Count(n) => Ok(n),
            other => Err(other.mismatch("Count")),
        }
    }
}
