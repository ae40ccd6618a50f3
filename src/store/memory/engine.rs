// ABOUTME: Query and update evaluation for the in-memory document store
// ABOUTME: Filters, update operators, sorting, projection, aggregation stages and unique indexes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::cmp::Ordering;

use mongodb::bson::{oid::ObjectId, Bson, Document};

use crate::constants::fields;
use crate::errors::{codes, StoreError, StoreResult};
use crate::operations::{
    BulkWriteSummary, FindOptions, Operation, OperationOutcome, UpdateSummary, WriteModel,
};
use crate::store::IndexSpec;

/// Secondary index kept by a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemIndex {
    pub(crate) name: String,
    fields: Vec<String>,
    unique: bool,
}

impl MemIndex {
    fn key_of(&self, document: &Document) -> Vec<Option<Bson>> {
        self.fields
            .iter()
            .map(|field| lookup(document, field).cloned())
            .collect()
    }
}

/// Documents plus indexes of one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct MemCollection {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<MemIndex>,
}

impl MemCollection {
    pub(crate) fn create_index(&mut self, spec: &IndexSpec) -> StoreResult<String> {
        let name = spec.resolved_name();
        if self.indexes.iter().any(|index| index.name == name) {
            return Ok(name);
        }
        let index = MemIndex {
            name: name.clone(),
            fields: spec.keys.keys().cloned().collect(),
            unique: spec.unique,
        };
        if index.unique {
            for (position, document) in self.documents.iter().enumerate() {
                let key = index.key_of(document);
                if self.documents[position + 1..]
                    .iter()
                    .any(|other| index.key_of(other) == key)
                {
                    return Err(StoreError::duplicate_key(format!(
                        "E11000 duplicate key error building index {name}"
                    )));
                }
            }
        }
        self.indexes.push(index);
        Ok(name)
    }

    fn check_unique(&self, candidate: &Document, skip: Option<usize>) -> StoreResult<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != skip)
            .map(|(_, document)| document);
        for other in others {
            if let (Some(id), Some(other_id)) = (candidate.get(fields::ID), other.get(fields::ID)) {
                if id == other_id {
                    return Err(StoreError::duplicate_key(format!(
                        "E11000 duplicate key error index: _id_ dup key: {{ _id: {id} }}"
                    )));
                }
            }
            for index in self.indexes.iter().filter(|index| index.unique) {
                if index.key_of(candidate) == index.key_of(other) {
                    return Err(StoreError::duplicate_key(format!(
                        "E11000 duplicate key error index: {}",
                        index.name
                    )));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, document: Document) -> StoreResult<Bson> {
        let document = with_id(document);
        self.check_unique(&document, None)?;
        let id = document.get(fields::ID).cloned().unwrap_or(Bson::Null);
        self.documents.push(document);
        Ok(id)
    }

    fn matching(&self, filter: &Document) -> StoreResult<Vec<usize>> {
        let mut positions = Vec::new();
        for (position, document) in self.documents.iter().enumerate() {
            if matches(document, filter)? {
                positions.push(position);
            }
        }
        Ok(positions)
    }

    fn update(
        &mut self,
        filter: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> StoreResult<UpdateSummary> {
        validate_update(update)?;
        let mut targets = self.matching(filter)?;
        if !multi {
            targets.truncate(1);
        }
        if targets.is_empty() {
            if upsert {
                let id = self.insert(upsert_seed(filter, update)?)?;
                return Ok(UpdateSummary {
                    upserted_id: Some(id),
                    ..UpdateSummary::default()
                });
            }
            return Ok(UpdateSummary::default());
        }
        let mut modified = 0;
        for &position in &targets {
            let mut candidate = self.documents[position].clone();
            if apply_update(&mut candidate, update, false)? {
                self.check_unique(&candidate, Some(position))?;
                self.documents[position] = candidate;
                modified += 1;
            }
        }
        Ok(UpdateSummary {
            matched: targets.len() as u64,
            modified,
            upserted_id: None,
        })
    }

    fn delete(&mut self, filter: &Document, multi: bool) -> StoreResult<u64> {
        let mut targets = self.matching(filter)?;
        if !multi {
            targets.truncate(1);
        }
        for &position in targets.iter().rev() {
            self.documents.remove(position);
        }
        Ok(targets.len() as u64)
    }

    fn find(&self, filter: &Document, options: &FindOptions) -> StoreResult<Vec<Document>> {
        let mut found: Vec<Document> = self
            .matching(filter)?
            .into_iter()
            .map(|position| self.documents[position].clone())
            .collect();
        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort);
        }
        let skip = options.skip.unwrap_or(0) as usize;
        let limit = options
            .limit
            .map(i64::unsigned_abs)
            .filter(|limit| *limit > 0)
            .map_or(usize::MAX, |limit| limit as usize);
        Ok(found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &options.projection {
                Some(projection) => project(&document, projection),
                None => document,
            })
            .collect())
    }

    fn find_one_and_update(
        &mut self,
        filter: &Document,
        update: &Document,
        upsert: bool,
        return_after: bool,
    ) -> StoreResult<Option<Document>> {
        validate_update(update)?;
        let Some(&position) = self.matching(filter)?.first() else {
            if !upsert {
                return Ok(None);
            }
            let seed = with_id(upsert_seed(filter, update)?);
            self.insert(seed.clone())?;
            return Ok(return_after.then_some(seed));
        };
        let before = self.documents[position].clone();
        let mut after = before.clone();
        if apply_update(&mut after, update, false)? {
            self.check_unique(&after, Some(position))?;
            self.documents[position] = after.clone();
        }
        Ok(Some(if return_after { after } else { before }))
    }

    fn aggregate(&self, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
        let mut documents = self.documents.clone();
        for stage in pipeline {
            let Some((name, spec)) = stage.iter().next() else {
                return Err(StoreError::command("empty pipeline stage"));
            };
            documents = match (name.as_str(), spec) {
                ("$match", Bson::Document(filter)) => {
                    let mut kept = Vec::with_capacity(documents.len());
                    for document in documents {
                        if matches(&document, filter)? {
                            kept.push(document);
                        }
                    }
                    kept
                }
                ("$sort", Bson::Document(sort)) => {
                    sort_documents(&mut documents, sort);
                    documents
                }
                ("$skip", value) => {
                    let skip = as_count(value).ok_or_else(|| stage_error(name))?;
                    documents.into_iter().skip(skip).collect()
                }
                ("$limit", value) => {
                    let limit = as_count(value).ok_or_else(|| stage_error(name))?;
                    documents.into_iter().take(limit).collect()
                }
                ("$project", Bson::Document(projection)) => documents
                    .iter()
                    .map(|document| project(document, projection))
                    .collect(),
                ("$count", Bson::String(field)) => {
                    let count = i32::try_from(documents.len()).map_or_else(
                        |_| Bson::Int64(documents.len() as i64),
                        Bson::Int32,
                    );
                    let mut result = Document::new();
                    result.insert(field.clone(), count);
                    vec![result]
                }
                _ => {
                    return Err(StoreError::command(format!(
                        "unsupported pipeline stage {name}"
                    )))
                }
            };
        }
        Ok(documents)
    }

    fn apply_model(&mut self, model: WriteModel, summary: &mut BulkWriteSummary) -> StoreResult<()> {
        match model {
            WriteModel::InsertOne { document } => {
                self.insert(document)?;
                summary.inserted += 1;
            }
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => merge_update(summary, &self.update(&filter, &update, upsert, false)?),
            WriteModel::UpdateMany {
                filter,
                update,
                upsert,
            } => merge_update(summary, &self.update(&filter, &update, upsert, true)?),
            WriteModel::DeleteOne { filter } => summary.deleted += self.delete(&filter, false)?,
            WriteModel::DeleteMany { filter } => summary.deleted += self.delete(&filter, true)?,
        }
        Ok(())
    }

    /// Run a data verb against this collection
    pub(crate) fn apply(&mut self, operation: Operation) -> StoreResult<OperationOutcome> {
        Ok(match operation {
            Operation::InsertOne { document } => OperationOutcome::Inserted(self.insert(document)?),
            Operation::InsertMany { documents, ordered } => {
                let mut ids = Vec::with_capacity(documents.len());
                let mut first_error = None;
                for document in documents {
                    match self.insert(document) {
                        Ok(id) => ids.push(id),
                        Err(e) if ordered => return Err(e),
                        Err(e) => {
                            first_error.get_or_insert(e);
                        }
                    }
                }
                if let Some(e) = first_error {
                    return Err(e);
                }
                OperationOutcome::InsertedMany(ids)
            }
            Operation::FindOne { filter, projection } => {
                let options = FindOptions {
                    projection,
                    limit: Some(1),
                    ..FindOptions::default()
                };
                OperationOutcome::Document(self.find(&filter, &options)?.into_iter().next())
            }
            Operation::FindMany { filter, options } => {
                OperationOutcome::Documents(self.find(&filter, &options)?)
            }
            Operation::UpdateOne {
                filter,
                update,
                upsert,
            } => OperationOutcome::Updated(self.update(&filter, &update, upsert, false)?),
            Operation::UpdateMany {
                filter,
                update,
                upsert,
            } => OperationOutcome::Updated(self.update(&filter, &update, upsert, true)?),
            Operation::DeleteOne { filter } => OperationOutcome::Deleted(self.delete(&filter, false)?),
            Operation::DeleteMany { filter } => OperationOutcome::Deleted(self.delete(&filter, true)?),
            Operation::Aggregate { pipeline } => OperationOutcome::Documents(self.aggregate(&pipeline)?),
            Operation::BulkWrite { models, ordered } => {
                let mut summary = BulkWriteSummary::default();
                let mut first_error = None;
                for model in models {
                    if let Err(e) = self.apply_model(model, &mut summary) {
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
            } => OperationOutcome::Document(self.find_one_and_update(
                &filter,
                &update,
                upsert,
                return_after,
            )?),
            Operation::CountDocuments { filter, limit } => {
                let count = self.matching(&filter)?.len() as u64;
                OperationOutcome::Count(limit.filter(|l| *l > 0).map_or(count, |l| count.min(l)))
            }
        })
    }
}

fn merge_update(summary: &mut BulkWriteSummary, update: &UpdateSummary) {
    summary.matched += update.matched;
    summary.modified += update.modified;
    summary.upserted += u64::from(update.upserted_id.is_some());
}

fn stage_error(stage: &str) -> StoreError {
    StoreError::command(format!("invalid argument to {stage} stage"))
}

fn with_id(document: Document) -> Document {
    if document.contains_key(fields::ID) {
        return document;
    }
    let mut stamped = Document::new();
    stamped.insert(fields::ID, ObjectId::new());
    stamped.extend(document);
    stamped
}

fn as_count(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        Bson::Double(n) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null => false,
        other => numeric(other).map_or(true, |n| n != 0.0),
    }
}

// Canonical cross-type sort order
const fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        _ => 11,
    }
}

/// Ordering between two values of comparable types
fn compare(a: &Bson, b: &Bson) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (numeric(a), numeric(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.timestamp_millis().cmp(&y.timestamp_millis())),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) => Some(Ordering::Equal),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn total_order(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let a = a.unwrap_or(&Bson::Null);
    let b = b.unwrap_or(&Bson::Null);
    compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
}

fn values_equal(a: &Bson, b: &Bson) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// Value at a dotted path
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            _ => return None,
        };
    }
    Some(current)
}

fn set_path(document: &mut Document, path: &str, value: Bson) -> StoreResult<()> {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            Ok(())
        }
        Some((head, rest)) => {
            let child = document
                .entry(head.to_owned())
                .or_insert_with(|| Bson::Document(Document::new()));
            match child {
                Bson::Document(inner) => set_path(inner, rest, value),
                _ => Err(StoreError::command(format!(
                    "cannot create field '{rest}' in element {{{head}: {child}}}"
                ))),
            }
        }
    }
}

fn remove_path(document: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            document.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Whether `document` satisfies `filter`
pub(crate) fn matches(document: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => all_clauses(document, condition)?.iter().all(|m| *m),
            "$or" => all_clauses(document, condition)?.iter().any(|m| *m),
            "$nor" => !all_clauses(document, condition)?.iter().any(|m| *m),
            operator if operator.starts_with('$') => {
                return Err(StoreError::invalid_argument(format!(
                    "unknown top level operator: {operator}"
                )))
            }
            path => field_matches(lookup(document, path), condition)?,
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_clauses(document: &Document, clauses: &Bson) -> StoreResult<Vec<bool>> {
    let Bson::Array(clauses) = clauses else {
        return Err(StoreError::invalid_argument("logical operators require an array"));
    };
    clauses
        .iter()
        .map(|clause| match clause {
            Bson::Document(filter) => matches(document, filter),
            _ => Err(StoreError::invalid_argument(
                "logical operator clauses must be documents",
            )),
        })
        .collect()
}

fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
        None => matches!(expected, Bson::Null),
    }
}

fn ordered(value: Option<&Bson>, operand: &Bson, accept: fn(Ordering) -> bool) -> bool {
    value
        .and_then(|actual| compare(actual, operand))
        .is_some_and(accept)
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> StoreResult<bool> {
    let Bson::Document(operators) = condition else {
        return Ok(equals(value, condition));
    };
    if !operators.keys().next().is_some_and(|k| k.starts_with('$')) {
        return Ok(equals(value, condition));
    }
    for (operator, operand) in operators {
        let satisfied = match operator.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => ordered(value, operand, Ordering::is_gt),
            "$gte" => ordered(value, operand, Ordering::is_ge),
            "$lt" => ordered(value, operand, Ordering::is_lt),
            "$lte" => ordered(value, operand, Ordering::is_le),
            "$in" | "$nin" => {
                let Bson::Array(candidates) = operand else {
                    return Err(StoreError::invalid_argument(format!("{operator} needs an array")));
                };
                let found = candidates.iter().any(|candidate| equals(value, candidate));
                if operator == "$in" {
                    found
                } else {
                    !found
                }
            }
            "$exists" => value.is_some() == truthy(operand),
            other => {
                return Err(StoreError::invalid_argument(format!(
                    "unknown operator: {other}"
                )))
            }
        };
        if !satisfied {
            return Ok(false);
        }
    }
    Ok(true)
}

fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::invalid_argument("update document must not be empty"));
    }
    if !update.keys().all(|key| key.starts_with('$')) {
        return Err(StoreError::invalid_argument(
            "update document requires atomic operators",
        ));
    }
    Ok(())
}

fn upsert_seed(filter: &Document, update: &Document) -> StoreResult<Document> {
    let mut seed = Document::new();
    for (key, value) in filter {
        let is_operator_expression = matches!(
            value,
            Bson::Document(inner) if inner.keys().next().is_some_and(|k| k.starts_with('$'))
        );
        if !key.starts_with('$') && !is_operator_expression {
            set_path(&mut seed, key, value.clone())?;
        }
    }
    apply_update(&mut seed, update, true)?;
    Ok(seed)
}

fn increment(current: Option<&Bson>, delta: &Bson) -> StoreResult<Bson> {
    let sum = match (current.unwrap_or(&Bson::Int32(0)), delta) {
        (Bson::Int32(a), Bson::Int32(b)) => a
            .checked_add(*b)
            .map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).saturating_add(*b)),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.saturating_add(i64::from(*b))),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.saturating_add(*b)),
        (a, b) => match (numeric(a), numeric(b)) {
            (Some(x), Some(y)) => Bson::Double(x + y),
            _ => {
                return Err(StoreError::command(
                    "cannot apply $inc to a value of non-numeric type",
                ))
            }
        },
    };
    Ok(sum)
}

/// Apply update operators in place; returns whether the document changed
fn apply_update(document: &mut Document, update: &Document, inserting: bool) -> StoreResult<bool> {
    let before = document.clone();
    for (operator, fields_spec) in update {
        let Bson::Document(fields_spec) = fields_spec else {
            return Err(StoreError::invalid_argument(format!(
                "modifier {operator} requires a document"
            )));
        };
        for (path, value) in fields_spec {
            match operator.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$setOnInsert" => {
                    if inserting {
                        set_path(document, path, value.clone())?;
                    }
                }
                "$unset" => remove_path(document, path),
                "$inc" => {
                    let next = increment(lookup(document, path), value)?;
                    set_path(document, path, next)?;
                }
                "$push" => {
                    let mut items = match lookup(document, path) {
                        Some(Bson::Array(items)) => items.clone(),
                        None => Vec::new(),
                        Some(_) => {
                            return Err(StoreError::command(format!(
                                "the field '{path}' must be an array"
                            )))
                        }
                    };
                    items.push(value.clone());
                    set_path(document, path, Bson::Array(items))?;
                }
                other => {
                    return Err(StoreError::invalid_argument(format!(
                        "unknown modifier: {other}"
                    )))
                }
            }
        }
    }
    if !inserting && before.get(fields::ID) != document.get(fields::ID) {
        return Err(StoreError::from_code(
            codes::IMMUTABLE_FIELD,
            "performing an update on the path '_id' would modify the immutable field '_id'",
        ));
    }
    Ok(*document != before)
}

fn sort_documents(documents: &mut [Document], sort: &Document) {
    documents.sort_by(|a, b| {
        for (path, direction) in sort {
            let ordering = total_order(lookup(a, path), lookup(b, path));
            let ordering = if numeric(direction).is_some_and(|d| d < 0.0) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn project(document: &Document, projection: &Document) -> Document {
    let include_id = projection.get(fields::ID).map_or(true, truthy);
    let inclusions: Vec<&String> = projection
        .iter()
        .filter(|(field, flag)| field.as_str() != fields::ID && truthy(flag))
        .map(|(field, _)| field)
        .collect();

    if inclusions.is_empty() {
        let mut projected = document.clone();
        for (field, flag) in projection {
            if !truthy(flag) {
                remove_path(&mut projected, field);
            }
        }
        return projected;
    }

    let mut projected = Document::new();
    if include_id {
        if let Some(id) = document.get(fields::ID) {
            projected.insert(fields::ID, id.clone());
        }
    }
    for field in inclusions {
        if let Some(value) = lookup(document, field) {
            // Paths into freshly created sub-documents cannot collide.
            let _ = set_path(&mut projected, field, value.clone());
        }
    }
    projected
}
