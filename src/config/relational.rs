// ABOUTME: Connection parameters for the relational source of the migration pipeline
// ABOUTME: Loaded from DOCBRIDGE_PG_* environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::fmt;
use std::time::Duration;

use super::environment::{env_or, env_string};
use crate::constants::{env_config, relational as defaults};
use crate::errors::{AppError, AppResult};

/// `PostgreSQL` connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct RelationalConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Login role
    pub user: String,
    /// Login secret
    pub password: String,
    /// Database name
    pub dbname: String,
    /// Schema scanned for tables
    pub schema: String,
    /// Pool size
    pub max_connections: u32,
    /// Pool acquire timeout
    pub acquire_timeout: Duration,
}

impl fmt::Debug for RelationalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("dbname", &self.dbname)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_owned(),
            port: defaults::DEFAULT_PORT,
            user: defaults::DEFAULT_USER.to_owned(),
            password: String::new(),
            dbname: defaults::DEFAULT_DBNAME.to_owned(),
            schema: defaults::DEFAULT_SCHEMA.to_owned(),
            max_connections: defaults::DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_secs(defaults::DEFAULT_ACQUIRE_TIMEOUT_SECS),
        }
    }
}

impl RelationalConfig {
    /// Load from `DOCBRIDGE_PG_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a malformed port or an empty host
    pub fn from_env() -> AppResult<Self> {
        let base = Self::default();
        let config = Self {
            host: env_string(env_config::PG_HOST).unwrap_or(base.host),
            port: env_or(env_config::PG_PORT, base.port)?,
            user: env_string(env_config::PG_USER).unwrap_or(base.user),
            password: env_string(env_config::PG_PASSWORD).unwrap_or_default(),
            dbname: env_string(env_config::PG_DBNAME).unwrap_or(base.dbname),
            schema: env_string(env_config::PG_SCHEMA).unwrap_or(base.schema),
            ..base
        };
        config.validate()?;
        Ok(config)
    }

    /// Check required fields
    ///
    /// # Errors
    ///
    /// Returns a configuration error when host, database or schema is blank
    pub fn validate(&self) -> AppResult<()> {
        if self.host.trim().is_empty() {
            return Err(AppError::config("PostgreSQL host must not be empty"));
        }
        if self.dbname.trim().is_empty() {
            return Err(AppError::config("PostgreSQL database name must not be empty"));
        }
        if self.schema.trim().is_empty() {
            return Err(AppError::config("PostgreSQL schema must not be empty"));
        }
        Ok(())
    }

    /// `postgres://` URL with percent-encoded credentials
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            urlencoding::encode(&self.dbname)
        )
    }

    /// `host:port/dbname`, used in logs and errors
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.dbname)
    }
}
