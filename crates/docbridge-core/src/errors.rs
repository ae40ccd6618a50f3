// ABOUTME: Unified error handling for docbridge with retry classification
// ABOUTME: Separates client-boundary failures from application errors surfaced to callers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! Error types
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is what a document-store client reports. Its
//!   [`StoreErrorKind`] decides whether a failure is transient.
//! - [`AppError`] is what callers of the data layer observe. Every variant
//!   names the operation and the target that failed.

use std::fmt;

use thiserror::Error;

/// Result alias used throughout docbridge
pub type AppResult<T> = Result<T, AppError>;

/// Result alias for client-boundary calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Server error codes the data layer interprets
pub mod codes {
    /// Malformed command argument
    pub const BAD_VALUE: i32 = 2;
    /// Collection or database does not exist
    pub const NAMESPACE_NOT_FOUND: i32 = 26;
    /// Command name is not recognised
    pub const COMMAND_NOT_FOUND: i32 = 59;
    /// Update tried to change an immutable field
    pub const IMMUTABLE_FIELD: i32 = 66;
    /// Command was interrupted by a server-side time limit
    pub const MAX_TIME_MS_EXPIRED: i32 = 50;
    /// Host could not be reached
    pub const HOST_UNREACHABLE: i32 = 6;
    /// Host name did not resolve
    pub const HOST_NOT_FOUND: i32 = 7;
    /// Principal does not exist
    pub const USER_NOT_FOUND: i32 = 11;
    /// Caller lacks the privilege for the command
    pub const UNAUTHORIZED: i32 = 13;
    /// Credentials were rejected
    pub const AUTHENTICATION_FAILED: i32 = 18;
    /// Network operation timed out
    pub const NETWORK_TIMEOUT: i32 = 89;
    /// Server is shutting down
    pub const SHUTDOWN_IN_PROGRESS: i32 = 91;
    /// Primary stepped down mid-operation
    pub const PRIMARY_STEPPED_DOWN: i32 = 189;
    /// Node is no longer a writable primary
    pub const NOT_WRITABLE_PRIMARY: i32 = 10107;
    /// Unique index violation
    pub const DUPLICATE_KEY: i32 = 11000;
    /// Node was interrupted at shutdown
    pub const INTERRUPTED_AT_SHUTDOWN: i32 = 11600;
    /// Principal already exists
    pub const USER_ALREADY_EXISTS: i32 = 51003;
}

/// Classification of a client-boundary failure
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    /// Socket or connection failure
    Network,
    /// Operation or network timeout
    Timeout,
    /// No suitable server could be selected in time
    ServerSelection,
    /// Topology changed under the operation (stepdown, shutdown); reconnecting helps
    AutoReconnect,
    /// Authentication or authorization failure
    Authorization,
    /// Unique index violation
    DuplicateKey,
    /// Administrative command targeted a missing principal
    UserNotFound,
    /// Administrative command targeted an existing principal
    UserAlreadyExists,
    /// Invalid argument passed to the client (bad URI, bad option)
    InvalidArgument,
    /// Server rejected the command for another reason
    CommandFailed,
    /// BSON encoding/decoding failure
    Serialization,
    /// Transaction state error
    Transaction,
    /// Anything else
    Other,
}

impl StoreErrorKind {
    /// Whether a failure of this kind is transient and worth retrying
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::ServerSelection | Self::AutoReconnect
        )
    }

    /// Stable lowercase name used in log fields
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::ServerSelection => "server_selection",
            Self::AutoReconnect => "auto_reconnect",
            Self::Authorization => "authorization",
            Self::DuplicateKey => "duplicate_key",
            Self::UserNotFound => "user_not_found",
            Self::UserAlreadyExists => "user_already_exists",
            Self::InvalidArgument => "invalid_argument",
            Self::CommandFailed => "command_failed",
            Self::Serialization => "serialization",
            Self::Transaction => "transaction",
            Self::Other => "other",
        }
    }

    /// Map a server error code onto a kind
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            codes::HOST_UNREACHABLE | codes::HOST_NOT_FOUND => Self::Network,
            codes::MAX_TIME_MS_EXPIRED | codes::NETWORK_TIMEOUT => Self::Timeout,
            codes::SHUTDOWN_IN_PROGRESS
            | codes::PRIMARY_STEPPED_DOWN
            | codes::NOT_WRITABLE_PRIMARY
            | codes::INTERRUPTED_AT_SHUTDOWN => Self::AutoReconnect,
            codes::UNAUTHORIZED | codes::AUTHENTICATION_FAILED => Self::Authorization,
            codes::USER_NOT_FOUND => Self::UserNotFound,
            codes::DUPLICATE_KEY => Self::DuplicateKey,
            codes::USER_ALREADY_EXISTS => Self::UserAlreadyExists,
            _ => Self::CommandFailed,
        }
    }
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a document-store client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error{}: {message}", .code.map(|c| format!(" (code {c})")).unwrap_or_default())]
pub struct StoreError {
    /// Failure classification
    pub kind: StoreErrorKind,
    /// Server error code, when the server produced one
    pub code: Option<i32>,
    /// Human readable detail
    pub message: String,
}

impl StoreError {
    /// Build an error of an explicit kind
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Build an error from a server error code
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::from_code(code),
            code: Some(code),
            message: message.into(),
        }
    }

    /// Connection failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Network, message)
    }

    /// Timeout
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Timeout, message)
    }

    /// Server selection timeout
    pub fn server_selection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::ServerSelection, message)
    }

    /// Topology change signal
    pub fn auto_reconnect(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::AutoReconnect, message)
    }

    /// Authorization failure (code 13)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::from_code(codes::UNAUTHORIZED, message)
    }

    /// Authentication failure (code 18)
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::from_code(codes::AUTHENTICATION_FAILED, message)
    }

    /// Unique index violation (code 11000)
    pub fn duplicate_key(message: impl Into<String>) -> Self {
        Self::from_code(codes::DUPLICATE_KEY, message)
    }

    /// Invalid argument passed to the client
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::InvalidArgument, message)
    }

    /// Generic command failure
    pub fn command(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::CommandFailed, message)
    }

    /// Encoding/decoding failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Serialization, message)
    }

    /// Transaction state failure
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Transaction, message)
    }

    /// Whether this failure is transient
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether this failure is an authentication/authorization rejection
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        self.kind == StoreErrorKind::Authorization
    }
}

/// Principal reconciliation outcome that the caller must be able to distinguish
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconciliationError {
    /// `create` targeted a principal that is already present
    #[error("principal '{principal}' already exists in '{database}'")]
    AlreadyExists {
        /// Principal name
        principal: String,
        /// Authentication database
        database: String,
    },
    /// `update`/`delete` targeted a principal that is absent
    #[error("principal '{principal}' not found in '{database}'")]
    NotFound {
        /// Principal name
        principal: String,
        /// Authentication database
        database: String,
    },
    /// The action name is not one of create, update, `ensure_exists`, delete
    #[error("invalid reconciliation action '{action}': must be one of create, update, ensure_exists, delete")]
    InvalidAction {
        /// Rejected action name
        action: String,
    },
}

/// Application-level error surfaced by every docbridge component
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid configuration; never retried
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection establishment or refresh failed
    #[error("connection to {target} failed: {source}")]
    Connection {
        /// `host:port/database` being connected to
        target: String,
        /// Underlying client failure
        #[source]
        source: StoreError,
    },

    /// Authentication/authorization rejected outside the initial-connect fallback
    #[error("not authorized for {target}: {message}")]
    Authorization {
        /// Command or resource that was rejected
        target: String,
        /// Server detail
        message: String,
    },

    /// Data verb failed after classification and retries
    #[error("operation '{verb}' on collection '{collection}' failed: {source}")]
    Operation {
        /// Verb name (`insert_one`, `find`, ...)
        verb: String,
        /// Target collection
        collection: String,
        /// Underlying failure
        #[source]
        source: Box<AppError>,
    },

    /// Retryable failure persisted past the policy's attempt ceiling
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Operation being retried
        operation: String,
        /// Number of attempts made
        attempts: u32,
        /// Last observed failure
        #[source]
        last: StoreError,
    },

    /// Principal reconciliation mismatch
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    /// Non-retryable client failure during a named operation
    #[error("{operation} failed: {source}")]
    Store {
        /// Operation that failed
        operation: String,
        /// Underlying client failure
        #[source]
        source: StoreError,
    },

    /// Resource already exists
    #[error("{0} already exists")]
    AlreadyExists(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Validation failure
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Verb name not in the supported set
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Relational source failure
    #[error("relational source error: {0}")]
    Relational(String),

    /// Encoding failure outside the client boundary
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Validation error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Missing resource
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// Duplicate resource
    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists(resource.into())
    }

    /// Relational source failure
    pub fn relational(message: impl Into<String>) -> Self {
        Self::Relational(message.into())
    }

    /// Serialization failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Translate a client failure observed during `operation`.
    ///
    /// Authorization rejections become [`AppError::Authorization`]; everything
    /// else is wrapped in [`AppError::Store`].
    pub fn store(operation: impl Into<String>, source: StoreError) -> Self {
        let operation = operation.into();
        if source.is_authorization() {
            Self::Authorization {
                target: operation,
                message: source.message,
            }
        } else {
            Self::Store { operation, source }
        }
    }

    /// Wrap a failure in the operation-specific error kind
    pub fn operation(verb: impl Into<String>, collection: impl Into<String>, source: Self) -> Self {
        Self::Operation {
            verb: verb.into(),
            collection: collection.into(),
            source: Box::new(source),
        }
    }

    /// Number of attempts reported by a retry exhaustion, looking through
    /// operation wrappers
    #[must_use]
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            Self::Operation { source, .. } => source.attempts(),
            _ => None,
        }
    }

    /// The client failure at the root of this error, if any
    #[must_use]
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Connection { source, .. } | Self::Store { source, .. } => Some(source),
            Self::RetriesExhausted { last, .. } => Some(last),
            Self::Operation { source, .. } => source.store_error(),
            _ => None,
        }
    }

    /// Whether the root failure is transient
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.store_error().is_some_and(StoreError::is_retryable)
    }

    /// Whether this error is (or wraps) an authorization rejection
    #[must_use]
    pub fn is_authorization(&self) -> bool {
        match self {
            Self::Authorization { .. } => true,
            Self::Operation { source, .. } => source.is_authorization(),
            Self::Connection { source, .. } => source.is_authorization(),
            _ => false,
        }
    }

    /// Whether this error signals a duplicate resource
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists(_)
                | Self::Reconciliation(ReconciliationError::AlreadyExists { .. })
        )
    }

    /// Whether this error signals a missing resource
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Reconciliation(ReconciliationError::NotFound { .. })
        )
    }

    /// Reconciliation detail, when this is a reconciliation error
    #[must_use]
    pub const fn reconciliation(&self) -> Option<&ReconciliationError> {
        match self {
            Self::Reconciliation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
