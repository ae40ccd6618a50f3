// ABOUTME: Bounded operation history kept per connection manager
// ABOUTME: Append-only ring buffer that evicts the oldest record at capacity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of records retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Final status of a recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Completed successfully
    Succeeded,
    /// Surfaced an error to the caller
    Failed,
}

/// One entry of the operation history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    /// When the operation finished
    pub at: DateTime<Utc>,
    /// Verb or lifecycle event name
    pub verb: String,
    /// `database.collection` or other target
    pub target: String,
    /// Final status
    pub status: OperationStatus,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl OperationRecord {
    /// Record stamped with the current time
    pub fn now(
        verb: impl Into<String>,
        target: impl Into<String>,
        status: OperationStatus,
        attempts: u32,
    ) -> Self {
        Self {
            at: Utc::now(),
            verb: verb.into(),
            target: target.into(),
            status,
            attempts,
        }
    }
}

/// Size-capped ring buffer of [`OperationRecord`]s
#[derive(Debug, Clone)]
pub struct OperationHistory {
    records: VecDeque<OperationRecord>,
    capacity: usize,
}

impl Default for OperationHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl OperationHistory {
    /// Empty history holding at most `capacity` records (minimum 1)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one when full
    pub fn push(&mut self, record: OperationRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records oldest-first
    #[must_use]
    pub fn snapshot(&self) -> Vec<OperationRecord> {
        self.records.iter().cloned().collect()
    }

    /// Number of retained records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum number of retained records
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
