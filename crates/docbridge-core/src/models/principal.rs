// ABOUTME: Server-level authentication principal types and reconciliation actions
// ABOUTME: Principals grant server access and are independent of application accounts
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ReconciliationError;

/// A `{role, db}` grant attached to a principal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalRole {
    /// Built-in or custom role name
    pub role: String,
    /// Database the role applies to
    pub db: String,
}

impl PrincipalRole {
    /// Create a role grant
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// Server-level authentication identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Principal name
    pub username: String,
    /// Authentication database the principal lives in
    pub database: String,
    /// Granted roles
    pub roles: Vec<PrincipalRole>,
}

/// Caller-selected reconciliation action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    /// Create; fails if present
    Create,
    /// Replace roles; fails if absent
    Update,
    /// Create if absent, otherwise replace roles
    EnsureExists,
    /// Drop; fails if absent
    Delete,
}

impl ReconcileAction {
    /// Wire name of the action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::EnsureExists => "ensure_exists",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ReconcileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconcileAction {
    type Err = ReconciliationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "ensure_exists" | "ensure-exists" => Ok(Self::EnsureExists),
            "delete" => Ok(Self::Delete),
            other => Err(ReconciliationError::InvalidAction {
                action: other.to_owned(),
            }),
        }
    }
}

/// Result of a successful reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Action that was executed
    pub action: ReconcileAction,
    /// Principal name
    pub principal: String,
    /// Authentication database
    pub database: String,
    /// Principal was created
    pub created: bool,
    /// Principal roles were replaced
    pub updated: bool,
    /// Principal was dropped
    pub deleted: bool,
}

impl ReconcileOutcome {
    /// Outcome with no effect flags set
    pub fn new(
        action: ReconcileAction,
        principal: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            action,
            principal: principal.into(),
            database: database.into(),
            created: false,
            updated: false,
            deleted: false,
        }
    }
}
