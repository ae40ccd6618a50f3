// ABOUTME: Immutable document-store connection parameters validated by a builder
// ABOUTME: Produces the connection URI and the parallel client settings structure
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! Connection configuration
//!
//! A [`ConnectionConfig`] is built once through [`ConnectionConfigBuilder`]
//! and never mutated afterwards. The connection manager derives a private
//! copy with authentication disabled when it has to fall back to an
//! unauthenticated connection; the caller's value is left untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::environment::{env_bool, env_or, env_string};
use crate::constants::{connection as defaults, env_config};
use crate::errors::{AppError, AppResult};
use crate::models::PrincipalRole;

/// TLS certificate validation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CertPolicy {
    /// Server certificate must validate
    Required,
    /// Validate when presented
    Optional,
    /// Skip certificate validation
    #[default]
    None,
}

impl CertPolicy {
    /// Canonical spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Required => "REQUIRED",
            Self::Optional => "OPTIONAL",
            Self::None => "NONE",
        }
    }

    /// Whether invalid certificates are accepted under this policy
    #[must_use]
    pub const fn allows_invalid_certificates(self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for CertPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.strip_prefix("CERT_").unwrap_or(&upper) {
            "REQUIRED" => Ok(Self::Required),
            "OPTIONAL" => Ok(Self::Optional),
            "NONE" => Ok(Self::None),
            _ => Err(AppError::config(format!(
                "Invalid certificate policy '{s}': expected REQUIRED, OPTIONAL or NONE"
            ))),
        }
    }
}

/// Replica member selection for reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    /// Primary only
    #[default]
    Primary,
    /// Primary, secondary if unavailable
    PrimaryPreferred,
    /// Secondaries only
    Secondary,
    /// Secondary, primary if unavailable
    SecondaryPreferred,
    /// Lowest latency member
    Nearest,
}

impl ReadPreference {
    /// URI spelling
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryPreferred => "primaryPreferred",
            Self::Secondary => "secondary",
            Self::SecondaryPreferred => "secondaryPreferred",
            Self::Nearest => "nearest",
        }
    }
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadPreference {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            Self::Primary,
            Self::PrimaryPreferred,
            Self::Secondary,
            Self::SecondaryPreferred,
            Self::Nearest,
        ]
        .into_iter()
        .find(|candidate| candidate.as_str().eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| AppError::config(format!("Invalid read preference '{s}'")))
    }
}

/// Write acknowledgment requirement (`w`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Acknowledgment {
    /// Number of nodes that must acknowledge
    Nodes(u32),
    /// A majority of voting members
    Majority,
    /// A custom tag set name
    Tag(String),
}

impl fmt::Display for Acknowledgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nodes(n) => write!(f, "{n}"),
            Self::Majority => f.write_str("majority"),
            Self::Tag(tag) => f.write_str(tag),
        }
    }
}

impl FromStr for Acknowledgment {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AppError::config("Write concern 'w' must not be empty"));
        }
        if let Ok(nodes) = trimmed.parse::<u32>() {
            return Ok(Self::Nodes(nodes));
        }
        if trimmed.eq_ignore_ascii_case("majority") {
            return Ok(Self::Majority);
        }
        Ok(Self::Tag(trimmed.to_owned()))
    }
}

/// Write concern; `w` is always present
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteConcernSetting {
    /// Acknowledgment requirement
    pub w: Acknowledgment,
    /// Wait for the journal
    pub journal: bool,
}

impl Default for WriteConcernSetting {
    fn default() -> Self {
        Self {
            w: Acknowledgment::Nodes(1),
            journal: true,
        }
    }
}

/// TLS parameters handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsSettings {
    /// Policy the settings were derived from
    pub cert_policy: CertPolicy,
    /// Accept certificates that fail validation
    pub allow_invalid_certificates: bool,
}

/// Client options that travel alongside the connection URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Minimum pooled connections
    pub min_pool_size: u32,
    /// Maximum pooled connections
    pub max_pool_size: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Server selection timeout
    pub server_selection_timeout: Duration,
    /// Socket timeout
    pub socket_timeout: Duration,
    /// Idle connection lifetime
    pub max_idle_time: Duration,
    /// Application name, when set
    pub app_name: Option<String>,
    /// Replica set name
    pub replica_set: Option<String>,
    /// Read preference
    pub read_preference: ReadPreference,
    /// Write concern
    pub write_concern: WriteConcernSetting,
    /// Retryable writes
    pub retry_writes: bool,
    /// Retryable reads
    pub retry_reads: bool,
    /// TLS parameters when TLS is enabled
    pub tls: Option<TlsSettings>,
    /// Free-form options
    pub extra_options: BTreeMap<String, String>,
}

/// Immutable document-store connection parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    database: String,
    username: Option<String>,
    password: Option<String>,
    auth_source: String,
    auth_mechanism: String,
    enable_auth: bool,
    app_name: Option<String>,
    min_pool_size: u32,
    max_pool_size: u32,
    connect_timeout: Duration,
    server_selection_timeout: Duration,
    socket_timeout: Duration,
    max_idle_time: Duration,
    tls: bool,
    cert_policy: CertPolicy,
    replica_set: Option<String>,
    read_preference: ReadPreference,
    write_concern: WriteConcernSetting,
    retry_writes: bool,
    retry_reads: bool,
    extra_options: BTreeMap<String, String>,
    provision_admin_principal: bool,
    admin_roles: Vec<PrincipalRole>,
    allow_unauthenticated_fallback: bool,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("auth_source", &self.auth_source)
            .field("auth_mechanism", &self.auth_mechanism)
            .field("enable_auth", &self.enable_auth)
            .field("app_name", &self.app_name)
            .field("pool", &(self.min_pool_size, self.max_pool_size))
            .field("tls", &self.tls)
            .field("cert_policy", &self.cert_policy)
            .field("replica_set", &self.replica_set)
            .field("read_preference", &self.read_preference)
            .field("write_concern", &self.write_concern)
            .field("provision_admin_principal", &self.provision_admin_principal)
            .field(
                "allow_unauthenticated_fallback",
                &self.allow_unauthenticated_fallback,
            )
            .finish_non_exhaustive()
    }
}

impl ConnectionConfig {
    /// Start building a configuration for `host:port/database`
    pub fn builder(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: Self::defaults(host.into(), port, database.into()),
        }
    }

    fn defaults(host: String, port: u16, database: String) -> Self {
        Self {
            host,
            port,
            database,
            username: None,
            password: None,
            auth_source: defaults::DEFAULT_AUTH_SOURCE.to_owned(),
            auth_mechanism: defaults::DEFAULT_AUTH_MECHANISM.to_owned(),
            enable_auth: true,
            app_name: Some(defaults::DEFAULT_APP_NAME.to_owned()),
            min_pool_size: defaults::DEFAULT_MIN_POOL_SIZE,
            max_pool_size: defaults::DEFAULT_MAX_POOL_SIZE,
            connect_timeout: Duration::from_secs(defaults::DEFAULT_CONNECT_TIMEOUT_SECS),
            server_selection_timeout: Duration::from_secs(
                defaults::DEFAULT_SERVER_SELECTION_TIMEOUT_SECS,
            ),
            socket_timeout: Duration::from_secs(defaults::DEFAULT_SOCKET_TIMEOUT_SECS),
            max_idle_time: Duration::from_secs(defaults::DEFAULT_MAX_IDLE_SECS),
            tls: false,
            cert_policy: CertPolicy::default(),
            replica_set: None,
            read_preference: ReadPreference::default(),
            write_concern: WriteConcernSetting::default(),
            retry_writes: true,
            retry_reads: true,
            extra_options: BTreeMap::new(),
            provision_admin_principal: false,
            admin_roles: vec![PrincipalRole::new(
                defaults::DEFAULT_ADMIN_ROLE,
                defaults::ADMIN_DATABASE,
            )],
            allow_unauthenticated_fallback: true,
        }
    }

    /// Load configuration from `DOCBRIDGE_MONGO_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is malformed or the
    /// resulting configuration fails validation
    pub fn from_env() -> AppResult<Self> {
        let mut builder = Self::builder(
            env_string(env_config::HOST).unwrap_or_else(|| defaults::DEFAULT_HOST.to_owned()),
            env_or(env_config::PORT, defaults::DEFAULT_PORT)?,
            env_string(env_config::DATABASE)
                .unwrap_or_else(|| defaults::DEFAULT_DATABASE.to_owned()),
        )
        .enable_auth(env_bool(env_config::ENABLE_AUTH, true)?)
        .pool_size(
            env_or(env_config::MIN_POOL_SIZE, defaults::DEFAULT_MIN_POOL_SIZE)?,
            env_or(env_config::MAX_POOL_SIZE, defaults::DEFAULT_MAX_POOL_SIZE)?,
        )
        .connect_timeout(Duration::from_secs(env_or(
            env_config::CONNECT_TIMEOUT_SECS,
            defaults::DEFAULT_CONNECT_TIMEOUT_SECS,
        )?))
        .server_selection_timeout(Duration::from_secs(env_or(
            env_config::SERVER_SELECTION_TIMEOUT_SECS,
            defaults::DEFAULT_SERVER_SELECTION_TIMEOUT_SECS,
        )?))
        .socket_timeout(Duration::from_secs(env_or(
            env_config::SOCKET_TIMEOUT_SECS,
            defaults::DEFAULT_SOCKET_TIMEOUT_SECS,
        )?))
        .max_idle_time(Duration::from_secs(env_or(
            env_config::MAX_IDLE_SECS,
            defaults::DEFAULT_MAX_IDLE_SECS,
        )?))
        .tls(
            env_bool(env_config::TLS, false)?,
            env_or(env_config::CERT_POLICY, CertPolicy::default())?,
        )
        .read_preference(env_or(env_config::READ_PREFERENCE, ReadPreference::default())?)
        .write_concern(WriteConcernSetting {
            w: env_or(env_config::WRITE_CONCERN_W, Acknowledgment::Nodes(1))?,
            journal: env_bool(env_config::WRITE_CONCERN_JOURNAL, true)?,
        })
        .retry_writes(env_bool(env_config::RETRY_WRITES, true)?)
        .retry_reads(env_bool(env_config::RETRY_READS, true)?)
        .provision_admin_principal(env_bool(env_config::PROVISION_ADMIN, false)?)
        .allow_unauthenticated_fallback(env_bool(
            env_config::ALLOW_UNAUTHENTICATED_FALLBACK,
            true,
        )?);

        if let (Some(user), Some(password)) = (
            env_string(env_config::USER),
            env_string(env_config::PASSWORD),
        ) {
            builder = builder.credentials(user, password);
        }
        if let Some(source) = env_string(env_config::AUTH_SOURCE) {
            builder = builder.auth_source(source);
        }
        if let Some(mechanism) = env_string(env_config::AUTH_MECHANISM) {
            builder = builder.auth_mechanism(mechanism);
        }
        if let Some(name) = env_string(env_config::APP_NAME) {
            builder = builder.app_name(name);
        }
        if let Some(replica_set) = env_string(env_config::REPLICA_SET) {
            builder = builder.replica_set(replica_set);
        }

        builder.build()
    }

    /// Reopen this configuration as a builder
    #[must_use]
    pub fn to_builder(&self) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder {
            config: self.clone(),
        }
    }

    /// Host name
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Default database
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Principal name
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Principal secret
    #[must_use]
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Authentication database
    #[must_use]
    pub fn auth_source(&self) -> &str {
        &self.auth_source
    }

    /// Authentication mechanism
    #[must_use]
    pub fn auth_mechanism(&self) -> &str {
        &self.auth_mechanism
    }

    /// Whether authentication is enabled
    #[must_use]
    pub const fn enable_auth(&self) -> bool {
        self.enable_auth
    }

    /// Application name
    #[must_use]
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Read preference
    #[must_use]
    pub const fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }

    /// Write concern
    #[must_use]
    pub const fn write_concern(&self) -> &WriteConcernSetting {
        &self.write_concern
    }

    /// TLS certificate policy
    #[must_use]
    pub const fn cert_policy(&self) -> CertPolicy {
        self.cert_policy
    }

    /// Whether the configured principal is provisioned on connect
    #[must_use]
    pub const fn provision_admin_principal(&self) -> bool {
        self.provision_admin_principal
    }

    /// Roles granted to a provisioned principal
    #[must_use]
    pub fn admin_roles(&self) -> &[PrincipalRole] {
        &self.admin_roles
    }

    /// Whether a rejected authenticated connect may fall back to an
    /// unauthenticated one
    #[must_use]
    pub const fn allow_unauthenticated_fallback(&self) -> bool {
        self.allow_unauthenticated_fallback
    }

    /// `host:port/database`, used in logs and errors
    #[must_use]
    pub fn target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }

    /// Whether credentials will be sent
    #[must_use]
    pub fn sends_credentials(&self) -> bool {
        self.enable_auth
            && self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self.password.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Assemble the connection URI
    ///
    /// Credentials and the authentication parameters appear only when
    /// authentication is enabled. Recognised parameters are emitted at most
    /// once in a fixed order, followed by the extra options.
    #[must_use]
    pub fn connection_string(&self) -> String {
        self.render_uri(self.password.as_deref().map(|p| urlencoding::encode(p).into_owned()))
    }

    /// Connection URI with the secret masked, safe for logs
    #[must_use]
    pub fn redacted_connection_string(&self) -> String {
        self.render_uri(self.password.as_ref().map(|_| "****".to_owned()))
    }

    fn render_uri(&self, encoded_password: Option<String>) -> String {
        let mut uri = String::from("mongodb://");
        if self.sends_credentials() {
            if let (Some(user), Some(password)) = (self.username.as_deref(), encoded_password) {
                uri.push_str(&urlencoding::encode(user));
                uri.push(':');
                uri.push_str(&password);
                uri.push('@');
            }
        }
        uri.push_str(&format!("{}:{}/{}", self.host, self.port, self.database));

        let mut params: Vec<(&str, String)> = Vec::new();
        if self.enable_auth {
            if !self.auth_source.is_empty() {
                params.push(("authSource", self.auth_source.clone()));
            }
            if !self.auth_mechanism.is_empty() {
                params.push(("authMechanism", self.auth_mechanism.clone()));
            }
        }
        if let Some(name) = self.app_name.as_deref().filter(|n| !n.is_empty()) {
            params.push(("appName", name.to_owned()));
        }
        if let Some(replica_set) = &self.replica_set {
            params.push(("replicaSet", replica_set.clone()));
        }
        params.push(("readPreference", self.read_preference.as_str().to_owned()));
        if self.retry_writes {
            params.push(("retryWrites", "true".to_owned()));
        }
        if self.retry_reads {
            params.push(("retryReads", "true".to_owned()));
        }
        for (key, value) in &self.extra_options {
            if !params.iter().any(|(existing, _)| existing.eq_ignore_ascii_case(key)) {
                params.push((key.as_str(), value.clone()));
            }
        }

        let query = params
            .iter()
            .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        if !query.is_empty() {
            uri.push('?');
            uri.push_str(&query);
        }
        uri
    }

    /// Options that accompany the URI when building a client
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            connect_timeout: self.connect_timeout,
            server_selection_timeout: self.server_selection_timeout,
            socket_timeout: self.socket_timeout,
            max_idle_time: self.max_idle_time,
            app_name: self.app_name.clone(),
            replica_set: self.replica_set.clone(),
            read_preference: self.read_preference,
            write_concern: self.write_concern.clone(),
            retry_writes: self.retry_writes,
            retry_reads: self.retry_reads,
            tls: self.tls.then_some(TlsSettings {
                cert_policy: self.cert_policy,
                allow_invalid_certificates: self.cert_policy.allows_invalid_certificates(),
            }),
            extra_options: self.extra_options.clone(),
        }
    }

    /// Copy of this configuration with authentication disabled
    #[must_use]
    pub(crate) fn without_auth(&self) -> Self {
        let mut copy = self.clone();
        copy.enable_auth = false;
        copy.provision_admin_principal = false;
        copy
    }
}

/// Builder for [`ConnectionConfig`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
#[must_use]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    /// Principal name and secret
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Authentication database
    pub fn auth_source(mut self, auth_source: impl Into<String>) -> Self {
        self.config.auth_source = auth_source.into();
        self
    }

    /// Authentication mechanism
    pub fn auth_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.config.auth_mechanism = mechanism.into();
        self
    }

    /// Enable or disable authentication
    pub const fn enable_auth(mut self, enabled: bool) -> Self {
        self.config.enable_auth = enabled;
        self
    }

    /// Application name reported to the server
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    /// Do not report an application name
    pub fn without_app_name(mut self) -> Self {
        self.config.app_name = None;
        self
    }

    /// Connection pool bounds
    pub const fn pool_size(mut self, min: u32, max: u32) -> Self {
        self.config.min_pool_size = min;
        self.config.max_pool_size = max;
        self
    }

    /// Connect timeout
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Server selection timeout
    pub const fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_selection_timeout = timeout;
        self
    }

    /// Socket timeout
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config.socket_timeout = timeout;
        self
    }

    /// Idle connection lifetime
    pub const fn max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time = idle;
        self
    }

    /// TLS toggle and certificate policy
    pub const fn tls(mut self, enabled: bool, cert_policy: CertPolicy) -> Self {
        self.config.tls = enabled;
        self.config.cert_policy = cert_policy;
        self
    }

    /// Replica set name
    pub fn replica_set(mut self, name: impl Into<String>) -> Self {
        self.config.replica_set = Some(name.into());
        self
    }

    /// Read preference
    pub const fn read_preference(mut self, preference: ReadPreference) -> Self {
        self.config.read_preference = preference;
        self
    }

    /// Write concern
    pub fn write_concern(mut self, concern: WriteConcernSetting) -> Self {
        self.config.write_concern = concern;
        self
    }

    /// Retryable writes
    pub const fn retry_writes(mut self, enabled: bool) -> Self {
        self.config.retry_writes = enabled;
        self
    }

    /// Retryable reads
    pub const fn retry_reads(mut self, enabled: bool) -> Self {
        self.config.retry_reads = enabled;
        self
    }

    /// Add a free-form option
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_options.insert(key.into(), value.into());
        self
    }

    /// Provision the configured principal during connect
    pub const fn provision_admin_principal(mut self, enabled: bool) -> Self {
        self.config.provision_admin_principal = enabled;
        self
    }

    /// Roles granted to the provisioned principal
    pub fn admin_roles(mut self, roles: Vec<PrincipalRole>) -> Self {
        self.config.admin_roles = roles;
        self
    }

    /// Allow falling back to an unauthenticated connection when credentials
    /// are rejected
    pub const fn allow_unauthenticated_fallback(mut self, allowed: bool) -> Self {
        self.config.allow_unauthenticated_fallback = allowed;
        self
    }

    /// Validate and freeze the configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the host is blank, the pool bounds
    /// are inconsistent, or provisioning is requested without credentials
    pub fn build(self) -> AppResult<ConnectionConfig> {
        let mut config = self.config;
        config.host = config.host.trim().to_owned();
        if config.host.is_empty() {
            return Err(AppError::config("Host must not be empty"));
        }
        if config.database.trim().is_empty() {
            return Err(AppError::config("Database name must not be empty"));
        }
        if config.max_pool_size == 0 {
            return Err(AppError::config("Maximum pool size must be at least 1"));
        }
        if config.min_pool_size > config.max_pool_size {
            return Err(AppError::config(format!(
                "Minimum pool size {} exceeds maximum {}",
                config.min_pool_size, config.max_pool_size
            )));
        }
        if config.provision_admin_principal && config.enable_auth && !config.sends_credentials() {
            return Err(AppError::config(
                "Admin principal provisioning requires both a username and a password",
            ));
        }
        if config.provision_admin_principal && config.admin_roles.is_empty() {
            return Err(AppError::config(
                "Admin principal provisioning requires at least one role",
            ));
        }
        Ok(config)
    }
}
