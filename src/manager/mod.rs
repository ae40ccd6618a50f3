// ABOUTME: Connection lifecycle management for the document store
// ABOUTME: Lazy connect with retry, liveness-checked handle access, unauthenticated fallback and history
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! # Connection manager
//!
//! A [`ConnectionManager`] owns at most one live client. The first call that
//! needs a client establishes it; every later [`get_client`] verifies
//! liveness with a `ping` and transparently reconnects after a transient
//! failure.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!                               │
//!                               └─auth rejected + fallback──▶ ConnectedNoAuth
//! ```
//!
//! `ConnectedNoAuth` is a degraded state: it is only entered when the
//! configuration explicitly allows it, it is logged at `warn`, and
//! [`ConnectionManager::effective_config`] reports the parameters actually in
//! use.
//!
//! [`get_client`]: ConnectionManager::get_client

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mongodb::bson::{doc, Document};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, warn};

use crate::config::ConnectionConfig;
use crate::constants::connection::ADMIN_DATABASE;
use crate::errors::{AppError, AppResult, StoreError, StoreErrorKind, StoreResult};
use crate::models::{OperationHistory, OperationRecord, OperationStatus};
use crate::operations::{Operation, OperationOutcome};
use crate::principals::{PrincipalReconciler, PrincipalSpec};
use crate::retry::RetryPolicy;
use crate::store::{Connector, DocumentClient, IndexSpec, Namespace, TransactionOptions};

/// Shared and scoped acquisition of managers
pub mod registry;
/// Session and transaction guards
pub mod scope;

pub use registry::{ConnectionLease, ConnectionRegistry, ScopedConnection};
pub use scope::{ScopedSession, ScopedTransaction};

/// Boxed future returned by transaction bodies
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No live client
    Disconnected,
    /// Establishment in progress
    Connecting,
    /// Live client using the configured parameters
    Connected,
    /// Live client after an explicit fallback to no authentication
    ConnectedNoAuth,
}

impl LifecycleState {
    /// Stable name used in logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::ConnectedNoAuth => "connected_no_auth",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a manager lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// One manager reused by every caller of a registry
    Shared,
    /// Owned by one caller and closed when its scope ends
    Scoped,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shared => "shared",
            Self::Scoped => "scoped",
        })
    }
}

struct ManagerState {
    client: Option<Arc<dyn DocumentClient>>,
    lifecycle: LifecycleState,
    effective: Option<ConnectionConfig>,
    history: OperationHistory,
}

/// Owns one document-store client and its lifecycle
pub struct ConnectionManager {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    lifetime: Lifetime,
    // Serialises establishment so concurrent first callers share one client
    connect_lock: AsyncMutex<()>,
    state: Mutex<ManagerState>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.config.target())
            .field("lifetime", &self.lifetime)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Manager that connects lazily with the default retry policy
    #[must_use]
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>, lifetime: Lifetime) -> Self {
        Self {
            config,
            connector,
            retry: RetryPolicy::default(),
            lifetime,
            connect_lock: AsyncMutex::new(()),
            state: Mutex::new(ManagerState {
                client: None,
                lifecycle: LifecycleState::Disconnected,
                effective: None,
                history: OperationHistory::default(),
            }),
        }
    }

    /// Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Bound the operation history
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .history = OperationHistory::with_capacity(capacity);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_client(&self) -> Option<Arc<dyn DocumentClient>> {
        self.lock_state().client.clone()
    }

    /// Configured parameters
    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Parameters of the live client; differs from [`config`](Self::config)
    /// after a fallback
    #[must_use]
    pub fn effective_config(&self) -> ConnectionConfig {
        self.lock_state()
            .effective
            .clone()
            .unwrap_or_else(|| self.config.clone())
    }

    /// Retry policy applied to connects, commands and data verbs
    #[must_use]
    pub const fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Shared or scoped
    #[must_use]
    pub const fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lock_state().lifecycle
    }

    /// Whether a live client is held
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            LifecycleState::Connected | LifecycleState::ConnectedNoAuth
        )
    }

    /// Recorded operations, oldest first
    #[must_use]
    pub fn recent_operations(&self) -> Vec<OperationRecord> {
        self.lock_state().history.snapshot()
    }

    /// Append to the operation history
    pub fn record_operation(&self, record: OperationRecord) {
        self.lock_state().history.push(record);
    }

    /// Namespace in `database`, or the configured default database
    #[must_use]
    pub fn namespace(&self, collection: &str, database: Option<&str>) -> Namespace {
        Namespace::new(database.unwrap_or(self.config.database()), collection)
    }

    /// Establish the client if none is held
    ///
    /// # Errors
    ///
    /// - [`AppError::Config`] when the client rejects the parameters
    /// - [`AppError::Authorization`] when authentication is rejected and no
    ///   fallback is allowed
    /// - [`AppError::RetriesExhausted`] when transient failures persist
    pub async fn connect(&self) -> AppResult<()> {
        let _guard = self.connect_lock.lock().await;
        if self.current_client().is_some() {
            return Ok(());
        }
        self.connect_locked().await.map(|_| ())
    }

    /// Live client, connecting or reconnecting as needed
    ///
    /// A held client is pinged first; a transient ping failure discards it and
    /// establishes a fresh one.
    ///
    /// # Errors
    ///
    /// Establishment failures as [`connect`](Self::connect), or a
    /// non-transient liveness failure
    pub async fn get_client(&self) -> AppResult<Arc<dyn DocumentClient>> {
        let _guard = self.connect_lock.lock().await;
        let Some(client) = self.current_client() else {
            return self.connect_locked().await;
        };
        match client.run_command(ADMIN_DATABASE, doc! { "ping": 1 }).await {
            Ok(_) => Ok(client),
            Err(e) if e.is_retryable() => {
                warn!(
                    target = %self.config.target(),
                    error = %e,
                    "Liveness check failed, reconnecting"
                );
                client.shutdown();
                {
                    let mut state = self.lock_state();
                    state.client = None;
                    state.lifecycle = LifecycleState::Disconnected;
                    state.history.push(OperationRecord::now(
                        "reconnect",
                        self.config.target(),
                        OperationStatus::Succeeded,
                        1,
                    ));
                }
                self.connect_locked().await
            }
            Err(e) => Err(AppError::store("ping", e)),
        }
    }

    async fn connect_locked(&self) -> AppResult<Arc<dyn DocumentClient>> {
        let target = self.config.target();
        self.lock_state().lifecycle = LifecycleState::Connecting;
        info!(
            target = %target,
            lifetime = %self.lifetime,
            auth = self.config.enable_auth(),
            "Connecting to document store"
        );

        let established = match self.establish(&self.config).await {
            Ok(client) => Ok((client, LifecycleState::Connected, None)),
            Err(e) if e.is_authorization() && self.config.enable_auth() => {
                if self.config.allow_unauthenticated_fallback() {
                    warn!(
                        target = %target,
                        error = %e,
                        "Authenticated connection rejected, falling back to an unauthenticated connection"
                    );
                    let fallback = self.config.without_auth();
                    self.establish(&fallback)
                        .await
                        .map(|client| (client, LifecycleState::ConnectedNoAuth, Some(fallback)))
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        };

        let mut state = self.lock_state();
        match established {
            Ok((client, lifecycle, effective)) => {
                state.client = Some(Arc::clone(&client));
                state.lifecycle = lifecycle;
                state.effective = effective;
                state.history.push(OperationRecord::now(
                    "connect",
                    target.clone(),
                    OperationStatus::Succeeded,
                    1,
                ));
                drop(state);
                info!(target = %target, state = %lifecycle, "Connected to document store");
                Ok(client)
            }
            Err(e) => {
                state.lifecycle = LifecycleState::Disconnected;
                state.effective = None;
                state.history.push(OperationRecord::now(
                    "connect",
                    target.clone(),
                    OperationStatus::Failed,
                    e.attempts().unwrap_or(1),
                ));
                drop(state);
                error!(target = %target, error = %e, "Failed to connect to document store");
                Err(e)
            }
        }
    }

    async fn establish(&self, config: &ConnectionConfig) -> AppResult<Arc<dyn DocumentClient>> {
        let uri = config.connection_string();
        let settings = config.client_settings();
        let target = config.target();
        let (uri, settings, target) = (uri.as_str(), &settings, target.as_str());
        let connector = &self.connector;

        self.retry
            .run("connect", move |attempt| async move {
                debug!(target = %target, attempt, "Establishing client");
                let client = connector
                    .connect(uri, settings)
                    .await
                    .map_err(|e| connection_error(target, e))?;
                if let Err(e) = verify(&client, config, target).await {
                    client.shutdown();
                    return Err(e);
                }
                Ok(client)
            })
            .await
    }

    /// Handle to `name`, or the configured default database
    ///
    /// # Errors
    ///
    /// Returns an error if no client can be obtained
    pub async fn database(&self, name: Option<&str>) -> AppResult<DatabaseHandle> {
        let client = self.get_client().await?;
        Ok(DatabaseHandle {
            client,
            name: name.unwrap_or(self.config.database()).to_owned(),
        })
    }

    /// Handle to a collection in `database`, or the configured default
    ///
    /// # Errors
    ///
    /// Returns an error if no client can be obtained
    pub async fn collection(
        &self,
        name: &str,
        database: Option<&str>,
    ) -> AppResult<CollectionHandle> {
        let client = self.get_client().await?;
        Ok(CollectionHandle {
            client,
            namespace: self.namespace(name, database),
        })
    }

    /// Run a database command with retries, recording it in the history
    ///
    /// # Errors
    ///
    /// The first fatal failure, or exhaustion of the retry policy
    pub async fn run_command(&self, database: Option<&str>, command: Document) -> AppResult<Document> {
        let database = database.unwrap_or(self.config.database()).to_owned();
        let name = command
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "command".to_owned());
        let (db, verb) = (database.as_str(), name.as_str());
        let mut attempts = 0;
        let result = self
            .retry
            .run(verb, |attempt| {
                attempts = attempt;
                let command = command.clone();
                async move {
                    let client = self.get_client().await?;
                    client
                        .run_command(db, command)
                        .await
                        .map_err(|e| AppError::store(verb, e))
                }
            })
            .await;
        let status = if result.is_ok() {
            OperationStatus::Succeeded
        } else {
            OperationStatus::Failed
        };
        self.record_operation(OperationRecord::now(&name, database, status, attempts));
        result
    }

    /// Open a session; it ends when the returned guard is dropped
    ///
    /// # Errors
    ///
    /// Returns an error if no client can be obtained or the session cannot
    /// start
    pub async fn session(&self, causal_consistency: bool) -> AppResult<ScopedSession> {
        let client = self.get_client().await?;
        let session = client
            .start_session(causal_consistency)
            .await
            .map_err(|e| AppError::store("start_session", e))?;
        debug!(causal_consistency, "Started session");
        Ok(ScopedSession::new(session, self.config.database()))
    }

    /// Open a session with a started transaction
    ///
    /// Dropping the guard without committing aborts the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or the transaction cannot start
    pub async fn transaction(&self, options: TransactionOptions) -> AppResult<ScopedTransaction> {
        let client = self.get_client().await?;
        let mut session = client
            .start_session(true)
            .await
            .map_err(|e| AppError::store("start_session", e))?;
        session
            .start_transaction(&options)
            .await
            .map_err(|e| AppError::store("start_transaction", e))?;
        debug!(?options, "Started transaction");
        Ok(ScopedTransaction::new(session, self.config.database()))
    }

    /// Run `body` inside a transaction: commit on `Ok`, abort on `Err`
    ///
    /// ```rust,no_run
    /// # use docbridge::manager::ConnectionManager;
    /// # use docbridge::store::TransactionOptions;
    /// # use mongodb::bson::doc;
    /// # async fn demo(manager: &ConnectionManager) -> docbridge::errors::AppResult<()> {
    /// manager
    ///     .run_transaction(TransactionOptions::default(), |tx| {
    ///         Box::pin(async move {
    ///             tx.insert_one("ledger", doc! { "amount": 10 }).await?;
    ///             Ok(())
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// The body's error (after aborting), or a start/commit failure
    pub async fn run_transaction<T, F>(&self, options: TransactionOptions, body: F) -> AppResult<T>
    where
        F: for<'t> FnOnce(&'t mut ScopedTransaction) -> BoxFuture<'t, AppResult<T>>,
    {
        let mut transaction = self.transaction(options).await?;
        match body(&mut transaction).await {
            Ok(value) => {
                transaction.commit().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_error) = transaction.abort().await {
                    warn!(error = %abort_error, "Failed to abort transaction");
                }
                Err(e)
            }
        }
    }

    /// Release the client; idempotent
    pub fn close(&self) {
        let client = {
            let mut state = self.lock_state();
            state.lifecycle = LifecycleState::Disconnected;
            state.effective = None;
            let client = state.client.take();
            if client.is_some() {
                state.history.push(OperationRecord::now(
                    "close",
                    self.config.target(),
                    OperationStatus::Succeeded,
                    1,
                ));
            }
            client
        };
        if let Some(client) = client {
            client.shutdown();
            info!(target = %self.config.target(), "Closed document store connection");
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

// Provisioning runs as part of establishment so an authorization failure
// there takes the same fallback path as a rejected handshake.
async fn verify(
    client: &Arc<dyn DocumentClient>,
    config: &ConnectionConfig,
    target: &str,
) -> AppResult<()> {
    client
        .run_command(ADMIN_DATABASE, doc! { "ping": 1 })
        .await
        .map_err(|e| connection_error(target, e))?;

    if config.enable_auth() && config.provision_admin_principal() {
        if let (Some(username), Some(password)) = (config.username(), config.password()) {
            let reconciler =
                PrincipalReconciler::with_client(Arc::clone(client), config.auth_source());
            let spec = PrincipalSpec::new(username)
                .secret(password)
                .roles(config.admin_roles().to_vec());
            reconciler.ensure_exists(&spec).await?;
        }
    }
    Ok(())
}

fn connection_error(target: &str, error: StoreError) -> AppError {
    match error.kind {
        StoreErrorKind::InvalidArgument => {
            AppError::config(format!("invalid connection parameters for {target}: {}", error.message))
        }
        StoreErrorKind::Authorization => AppError::Authorization {
            target: format!("connect {target}"),
            message: error.message,
        },
        _ => AppError::Connection {
            target: target.to_owned(),
            source: error,
        },
    }
}

/// Database handle bound to a live client
#[derive(Clone)]
pub struct DatabaseHandle {
    client: Arc<dyn DocumentClient>,
    name: String,
}

impl DatabaseHandle {
    /// Database name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection in this database
    #[must_use]
    pub fn collection(&self, name: &str) -> CollectionHandle {
        CollectionHandle {
            client: Arc::clone(&self.client),
            namespace: Namespace::new(&self.name, name),
        }
    }

    /// Run a command against this database, without retries
    ///
    /// # Errors
    ///
    /// Returns the client failure
    pub async fn run_command(&self, command: Document) -> StoreResult<Document> {
        self.client.run_command(&self.name, command).await
    }
}

/// Collection handle bound to a live client
#[derive(Clone)]
pub struct CollectionHandle {
    client: Arc<dyn DocumentClient>,
    namespace: Namespace,
}

impl CollectionHandle {
    /// Fully qualified namespace
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Collection name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.namespace.collection
    }

    /// Execute one data verb, without retries
    ///
    /// # Errors
    ///
    /// Returns the client failure
    pub async fn execute(&self, operation: Operation) -> StoreResult<OperationOutcome> {
        self.client.execute(&self.namespace, operation).await
    }

    /// Create an index
    ///
    /// # Errors
    ///
    /// Returns the client failure
    pub async fn create_index(&self, index: IndexSpec) -> StoreResult<String> {
        self.client.create_index(&self.namespace, index).await
    }
}
