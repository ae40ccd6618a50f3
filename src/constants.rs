// ABOUTME: Default values and environment variable names used across docbridge
// ABOUTME: Centralizes connection, retry and migration tunables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

/// Connection defaults
pub mod connection {
    /// Default host
    pub const DEFAULT_HOST: &str = "localhost";
    /// Default document-store port
    pub const DEFAULT_PORT: u16 = 27017;
    /// Default database name
    pub const DEFAULT_DATABASE: &str = "docbridge";
    /// Default authentication database
    pub const DEFAULT_AUTH_SOURCE: &str = "admin";
    /// Default authentication mechanism
    pub const DEFAULT_AUTH_MECHANISM: &str = "SCRAM-SHA-256";
    /// Default application name reported to the server
    pub const DEFAULT_APP_NAME: &str = "docbridge";
    /// Minimum pooled connections
    pub const DEFAULT_MIN_POOL_SIZE: u32 = 5;
    /// Maximum pooled connections
    pub const DEFAULT_MAX_POOL_SIZE: u32 = 20;
    /// Connect timeout in seconds
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
    /// Server selection timeout in seconds
    pub const DEFAULT_SERVER_SELECTION_TIMEOUT_SECS: u64 = 30;
    /// Socket timeout in seconds
    pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 30;
    /// Idle connection lifetime in seconds
    pub const DEFAULT_MAX_IDLE_SECS: u64 = 600;
    /// Role granted to a provisioned admin principal
    pub const DEFAULT_ADMIN_ROLE: &str = "root";
    /// Database used for liveness probes
    pub const ADMIN_DATABASE: &str = "admin";
}

/// Retry defaults
pub mod retry {
    /// Total attempts including the first
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// First backoff delay in milliseconds
    pub const DEFAULT_BASE_DELAY_MS: u64 = 100;
    /// Backoff ceiling in milliseconds
    pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
    /// Lower bound of the jitter scale factor
    pub const JITTER_MIN: f64 = 0.5;
}

/// Relational source defaults
pub mod relational {
    /// Default `PostgreSQL` host
    pub const DEFAULT_HOST: &str = "localhost";
    /// Default `PostgreSQL` port
    pub const DEFAULT_PORT: u16 = 5432;
    /// Default `PostgreSQL` user
    pub const DEFAULT_USER: &str = "postgres";
    /// Default `PostgreSQL` database
    pub const DEFAULT_DBNAME: &str = "postgres";
    /// Default schema scanned for tables
    pub const DEFAULT_SCHEMA: &str = "public";
    /// Pool size for the read-only source
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    /// Pool acquire timeout in seconds
    pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
}

/// Migration defaults
pub mod migration {
    /// Rows fetched per page
    pub const DEFAULT_BATCH_SIZE: usize = 1_000;
}

/// Account store defaults
pub mod accounts {
    /// Collection holding application accounts
    pub const COLLECTION: &str = "users";
}

/// Field names stamped by the operation executor
pub mod fields {
    /// Creation timestamp
    pub const CREATED_AT: &str = "_created_at";
    /// Last update timestamp
    pub const UPDATED_AT: &str = "_updated_at";
    /// Document identifier
    pub const ID: &str = "_id";
}

/// Environment variable names
pub mod env_config {
    /// Document-store host
    pub const HOST: &str = "DOCBRIDGE_MONGO_HOST";
    /// Document-store port
    pub const PORT: &str = "DOCBRIDGE_MONGO_PORT";
    /// Default database
    pub const DATABASE: &str = "DOCBRIDGE_MONGO_DATABASE";
    /// Principal name
    pub const USER: &str = "DOCBRIDGE_MONGO_USER";
    /// Principal secret
    pub const PASSWORD: &str = "DOCBRIDGE_MONGO_PASSWORD";
    /// Authentication database
    pub const AUTH_SOURCE: &str = "DOCBRIDGE_MONGO_AUTH_SOURCE";
    /// Authentication mechanism
    pub const AUTH_MECHANISM: &str = "DOCBRIDGE_MONGO_AUTH_MECHANISM";
    /// Authentication toggle
    pub const ENABLE_AUTH: &str = "DOCBRIDGE_MONGO_ENABLE_AUTH";
    /// Application name
    pub const APP_NAME: &str = "DOCBRIDGE_MONGO_APP_NAME";
    /// Minimum pool size
    pub const MIN_POOL_SIZE: &str = "DOCBRIDGE_MONGO_MIN_POOL_SIZE";
    /// Maximum pool size
    pub const MAX_POOL_SIZE: &str = "DOCBRIDGE_MONGO_MAX_POOL_SIZE";
    /// Connect timeout (seconds)
    pub const CONNECT_TIMEOUT_SECS: &str = "DOCBRIDGE_MONGO_CONNECT_TIMEOUT_SECS";
    /// Server selection timeout (seconds)
    pub const SERVER_SELECTION_TIMEOUT_SECS: &str = "DOCBRIDGE_MONGO_SERVER_SELECTION_TIMEOUT_SECS";
    /// Socket timeout (seconds)
    pub const SOCKET_TIMEOUT_SECS: &str = "DOCBRIDGE_MONGO_SOCKET_TIMEOUT_SECS";
    /// Idle connection lifetime (seconds)
    pub const MAX_IDLE_SECS: &str = "DOCBRIDGE_MONGO_MAX_IDLE_SECS";
    /// TLS toggle
    pub const TLS: &str = "DOCBRIDGE_MONGO_TLS";
    /// TLS certificate policy
    pub const CERT_POLICY: &str = "DOCBRIDGE_MONGO_CERT_POLICY";
    /// Replica set name
    pub const REPLICA_SET: &str = "DOCBRIDGE_MONGO_REPLICA_SET";
    /// Read preference
    pub const READ_PREFERENCE: &str = "DOCBRIDGE_MONGO_READ_PREFERENCE";
    /// Write concern acknowledgment (`1`, `majority`, tag)
    pub const WRITE_CONCERN_W: &str = "DOCBRIDGE_MONGO_WRITE_CONCERN_W";
    /// Write concern journal flag
    pub const WRITE_CONCERN_JOURNAL: &str = "DOCBRIDGE_MONGO_WRITE_CONCERN_JOURNAL";
    /// Retryable writes toggle
    pub const RETRY_WRITES: &str = "DOCBRIDGE_MONGO_RETRY_WRITES";
    /// Retryable reads toggle
    pub const RETRY_READS: &str = "DOCBRIDGE_MONGO_RETRY_READS";
    /// Provision the configured principal on connect
    pub const PROVISION_ADMIN: &str = "DOCBRIDGE_MONGO_PROVISION_ADMIN";
    /// Allow falling back to an unauthenticated connection
    pub const ALLOW_UNAUTHENTICATED_FALLBACK: &str = "DOCBRIDGE_MONGO_ALLOW_UNAUTHENTICATED_FALLBACK";
    /// Retry attempts
    pub const RETRY_MAX_ATTEMPTS: &str = "DOCBRIDGE_RETRY_MAX_ATTEMPTS";
    /// Retry base delay (milliseconds)
    pub const RETRY_BASE_DELAY_MS: &str = "DOCBRIDGE_RETRY_BASE_DELAY_MS";
    /// Retry delay ceiling (milliseconds)
    pub const RETRY_MAX_DELAY_MS: &str = "DOCBRIDGE_RETRY_MAX_DELAY_MS";
    /// `PostgreSQL` host
    pub const PG_HOST: &str = "DOCBRIDGE_PG_HOST";
    /// `PostgreSQL` port
    pub const PG_PORT: &str = "DOCBRIDGE_PG_PORT";
    /// `PostgreSQL` user
    pub const PG_USER: &str = "DOCBRIDGE_PG_USER";
    /// `PostgreSQL` password
    pub const PG_PASSWORD: &str = "DOCBRIDGE_PG_PASSWORD";
    /// `PostgreSQL` database
    pub const PG_DBNAME: &str = "DOCBRIDGE_PG_DBNAME";
    /// `PostgreSQL` schema
    pub const PG_SCHEMA: &str = "DOCBRIDGE_PG_SCHEMA";
    /// Log output format (`json` or `pretty`)
    pub const LOG_FORMAT: &str = "DOCBRIDGE_LOG_FORMAT";
}
