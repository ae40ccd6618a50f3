// ABOUTME: In-process document store implementing the client boundary traits
// ABOUTME: Supports principals, unique indexes, staged transactions and scripted fault injection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! In-memory backend
//!
//! A [`MemoryServer`] stands in for a deployment: every client created by its
//! [`MemoryConnector`] shares the same databases and principals. Faults can be
//! scripted per call target to exercise retry, reconnection and fallback
//! paths without a live server.
//!
//! Transactions stage copies of the collections they touch and publish them
//! on commit. Concurrent writers to the same collection are last-writer-wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use mongodb::bson::Document;
use tracing::debug;
use url::Url;

use super::{
    Connector, DocumentClient, DocumentSession, IndexSpec, Namespace, TransactionOptions,
};
use crate::config::{ClientSettings, ReadPreference};
use crate::errors::{StoreError, StoreResult};
use crate::models::{Principal, PrincipalRole};
use crate::operations::{Operation, OperationKind, OperationOutcome};

mod commands;
mod engine;

use engine::MemCollection;

/// Call site a [`Fault`] applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultTarget {
    /// Client construction
    Connect,
    /// A named database command (`ping`, `usersInfo`, ...)
    Command(String),
    /// A data verb
    Operation(OperationKind),
    /// Any command or data verb
    Any,
}

impl FaultTarget {
    /// Shorthand for [`FaultTarget::Command`]
    pub fn command(name: impl Into<String>) -> Self {
        Self::Command(name.into())
    }

    fn applies_to(&self, call: &Call<'_>) -> bool {
        match (self, call) {
            (Self::Connect, Call::Connect) => true,
            (Self::Command(wanted), Call::Command(name)) => wanted == name,
            (Self::Operation(wanted), Call::Operation(kind)) => wanted == kind,
            (Self::Any, Call::Command(_) | Call::Operation(_)) => true,
            _ => false,
        }
    }
}

/// Scripted failure
#[derive(Debug, Clone)]
pub struct Fault {
    target: FaultTarget,
    error: StoreError,
    skip: u32,
    remaining: u32,
}

impl Fault {
    /// Fail the next matching call once with `error`
    #[must_use]
    pub const fn new(target: FaultTarget, error: StoreError) -> Self {
        Self {
            target,
            error,
            skip: 0,
            remaining: 1,
        }
    }

    /// Fail `times` matching calls
    #[must_use]
    pub const fn times(mut self, times: u32) -> Self {
        self.remaining = times;
        self
    }

    /// Let `calls` matching calls succeed before failing
    #[must_use]
    pub const fn after(mut self, calls: u32) -> Self {
        self.skip = calls;
        self
    }
}

enum Call<'a> {
    Connect,
    Command(&'a str),
    Operation(OperationKind),
}

impl Call<'_> {
    fn counter_key(&self) -> String {
        match self {
            Self::Connect => "connect".to_owned(),
            Self::Command(name) => format!("command:{name}"),
            Self::Operation(kind) => format!("operation:{kind}"),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredPrincipal {
    pub(crate) password: String,
    pub(crate) roles: Vec<PrincipalRole>,
    pub(crate) custom_data: Option<Document>,
}

#[derive(Debug, Default)]
pub(crate) struct ServerState {
    pub(crate) databases: BTreeMap<String, BTreeMap<String, MemCollection>>,
    pub(crate) principals: BTreeMap<(String, String), StoredPrincipal>,
    pub(crate) enforce_authentication: bool,
    pub(crate) restrict_user_admin: bool,
    pub(crate) live_clients: u32,
    pub(crate) total_clients: u32,
}

impl ServerState {
    fn collection_mut(&mut self, namespace: &Namespace) -> &mut MemCollection {
        self.databases
            .entry(namespace.database.clone())
            .or_default()
            .entry(namespace.collection.clone())
            .or_default()
    }

    fn collection(&self, namespace: &Namespace) -> Option<&MemCollection> {
        self.databases
            .get(&namespace.database)
            .and_then(|collections| collections.get(&namespace.collection))
    }
}

#[derive(Debug, Default)]
struct ServerInner {
    state: Mutex<ServerState>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<HashMap<String, u32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-process deployment
#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    inner: Arc<ServerInner>,
}

impl MemoryServer {
    /// Empty deployment without authentication enforcement
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector producing clients of this deployment
    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            server: self.clone(),
        }
    }

    /// Require credentialed clients to match an existing principal; rejected
    /// clients fail every call with an authentication error
    pub fn set_enforce_authentication(&self, enforce: bool) {
        lock(&self.inner.state).enforce_authentication = enforce;
    }

    /// Deny principal management commands to unauthenticated clients
    pub fn set_restrict_user_admin(&self, restrict: bool) {
        lock(&self.inner.state).restrict_user_admin = restrict;
    }

    /// Script a failure
    pub fn inject(&self, fault: Fault) {
        lock(&self.inner.faults).push(fault);
    }

    /// Remove every scripted failure
    pub fn clear_faults(&self) {
        lock(&self.inner.faults).clear();
    }

    /// Client constructions attempted
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.count(&Call::Connect)
    }

    /// Calls of a named command
    #[must_use]
    pub fn command_count(&self, name: &str) -> u32 {
        self.count(&Call::Command(name))
    }

    /// Calls of a data verb
    #[must_use]
    pub fn operation_count(&self, kind: OperationKind) -> u32 {
        self.count(&Call::Operation(kind))
    }

    fn count(&self, call: &Call<'_>) -> u32 {
        lock(&self.inner.calls)
            .get(&call.counter_key())
            .copied()
            .unwrap_or(0)
    }

    /// Clients created and not yet shut down
    #[must_use]
    pub fn live_clients(&self) -> u32 {
        lock(&self.inner.state).live_clients
    }

    /// Seed a principal
    pub fn add_principal(
        &self,
        database: &str,
        username: &str,
        password: &str,
        roles: Vec<PrincipalRole>,
    ) {
        lock(&self.inner.state).principals.insert(
            (database.to_owned(), username.to_owned()),
            StoredPrincipal {
                password: password.to_owned(),
                roles,
                custom_data: None,
            },
        );
    }

    /// Stored principal, if present
    #[must_use]
    pub fn principal(&self, database: &str, username: &str) -> Option<Principal> {
        lock(&self.inner.state)
            .principals
            .get(&(database.to_owned(), username.to_owned()))
            .map(|stored| Principal {
                username: username.to_owned(),
                database: database.to_owned(),
                roles: stored.roles.clone(),
            })
    }

    /// Snapshot of a collection's documents in insertion order
    #[must_use]
    pub fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        lock(&self.inner.state)
            .collection(&Namespace::new(database, collection))
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Collection names of a database
    #[must_use]
    pub fn collection_names(&self, database: &str) -> Vec<String> {
        lock(&self.inner.state)
            .databases
            .get(database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Index names of a collection, excluding the implicit `_id_` index
    #[must_use]
    pub fn index_names(&self, database: &str, collection: &str) -> Vec<String> {
        lock(&self.inner.state)
            .collection(&Namespace::new(database, collection))
            .map(|c| c.indexes.iter().map(|index| index.name.clone()).collect())
            .unwrap_or_default()
    }

    fn intercept(&self, call: &Call<'_>) -> StoreResult<()> {
        *lock(&self.inner.calls).entry(call.counter_key()).or_insert(0) += 1;
        let mut faults = lock(&self.inner.faults);
        let mut fired = None;
        for fault in faults.iter_mut() {
            if !fault.target.applies_to(call) || fault.remaining == 0 {
                continue;
            }
            if fault.skip > 0 {
                fault.skip -= 1;
                continue;
            }
            fault.remaining -= 1;
            fired = Some(fault.error.clone());
            break;
        }
        faults.retain(|fault| fault.remaining > 0);
        fired.map_or(Ok(()), Err)
    }
}

/// Who a client authenticated as
#[derive(Debug, Clone, Default)]
pub(crate) struct ClientIdentity {
    principal: Option<(String, String)>,
    rejected: bool,
}

impl ClientIdentity {
    pub(crate) const fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

/// Builds clients of a [`MemoryServer`]
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    server: MemoryServer,
}

impl MemoryConnector {
    /// Underlying deployment
    #[must_use]
    pub const fn server(&self) -> &MemoryServer {
        &self.server
    }

    fn identify(&self, uri: &Url) -> StoreResult<ClientIdentity> {
        let username = urlencoding::decode(uri.username())
            .map_err(|e| StoreError::invalid_argument(format!("invalid username encoding: {e}")))?
            .into_owned();
        if username.is_empty() {
            return Ok(ClientIdentity::default());
        }
        let password = urlencoding::decode(uri.password().unwrap_or_default())
            .map_err(|e| StoreError::invalid_argument(format!("invalid password encoding: {e}")))?
            .into_owned();
        let auth_source = uri
            .query_pairs()
            .find(|(key, _)| key == "authSource")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_else(|| {
                let path = uri.path().trim_start_matches('/');
                (if path.is_empty() { "admin" } else { path }).to_owned()
            });

        let state = lock(&self.server.inner.state);
        let known = state
            .principals
            .get(&(auth_source.clone(), username.clone()))
            .is_some_and(|stored| stored.password == password);
        if state.enforce_authentication && !known {
            return Ok(ClientIdentity {
                principal: None,
                rejected: true,
            });
        }
        Ok(ClientIdentity {
            principal: Some((auth_source, username)),
            rejected: false,
        })
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(
        &self,
        uri: &str,
        _settings: &ClientSettings,
    ) -> StoreResult<Arc<dyn DocumentClient>> {
        self.server.intercept(&Call::Connect)?;
        let parsed = Url::parse(uri)
            .map_err(|e| StoreError::invalid_argument(format!("invalid connection string: {e}")))?;
        if parsed.scheme() != "mongodb" {
            return Err(StoreError::invalid_argument(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }
        let identity = self.identify(&parsed)?;
        {
            let mut state = lock(&self.server.inner.state);
            state.live_clients += 1;
            state.total_clients += 1;
        }
        debug!(authenticated = identity.is_authenticated(), "Memory client created");
        Ok(Arc::new(MemoryClient {
            server: self.server.clone(),
            identity,
            closed: Arc::new(AtomicBool::new(false)),
        }))
    }
}

/// Client of a [`MemoryServer`]
#[derive(Debug)]
pub struct MemoryClient {
    server: MemoryServer,
    identity: ClientIdentity,
    closed: Arc<AtomicBool>,
}

fn ensure_usable(closed: &AtomicBool, identity: &ClientIdentity) -> StoreResult<()> {
    if closed.load(Ordering::Acquire) {
        return Err(StoreError::network("client has been shut down"));
    }
    if identity.rejected {
        return Err(StoreError::authentication_failed("Authentication failed."));
    }
    Ok(())
}

#[async_trait]
impl DocumentClient for MemoryClient {
    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document> {
        ensure_usable(&self.closed, &self.identity)?;
        let name = command.keys().next().cloned().unwrap_or_default();
        self.server.intercept(&Call::Command(&name))?;
        let mut state = lock(&self.server.inner.state);
        commands::run(&mut state, database, &command, &self.identity)
    }

    async fn execute(
        &self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome> {
        ensure_usable(&self.closed, &self.identity)?;
        self.server.intercept(&Call::Operation(operation.kind()))?;
        let mut state = lock(&self.server.inner.state);
        if operation.kind().is_write() {
            state.collection_mut(namespace).apply(operation)
        } else {
            state
                .collection(namespace)
                .cloned()
                .unwrap_or_default()
                .apply(operation)
        }
    }

    async fn create_index(&self, namespace: &Namespace, index: IndexSpec) -> StoreResult<String> {
        ensure_usable(&self.closed, &self.identity)?;
        self.server.intercept(&Call::Command("createIndexes"))?;
        lock(&self.server.inner.state)
            .collection_mut(namespace)
            .create_index(&index)
    }

    async fn start_session(
        &self,
        causal_consistency: bool,
    ) -> StoreResult<Box<dyn DocumentSession>> {
        ensure_usable(&self.closed, &self.identity)?;
        Ok(Box::new(MemorySession {
            server: self.server.clone(),
            identity: self.identity.clone(),
            closed: Arc::clone(&self.closed),
            causal_consistency,
            staged: None,
        }))
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut state = lock(&self.server.inner.state);
            state.live_clients = state.live_clients.saturating_sub(1);
        }
    }
}

/// Session of a [`MemoryClient`]; dropping it discards staged writes
#[derive(Debug)]
pub struct MemorySession {
    server: MemoryServer,
    identity: ClientIdentity,
    closed: Arc<AtomicBool>,
    causal_consistency: bool,
    staged: Option<BTreeMap<Namespace, MemCollection>>,
}

impl MemorySession {
    /// Whether the session was opened with causal consistency
    #[must_use]
    pub const fn causal_consistency(&self) -> bool {
        self.causal_consistency
    }
}

#[async_trait]
impl DocumentSession for MemorySession {
    async fn start_transaction(&mut self, options: &TransactionOptions) -> StoreResult<()> {
        ensure_usable(&self.closed, &self.identity)?;
        if self.staged.is_some() {
            return Err(StoreError::transaction("transaction already in progress"));
        }
        if options
            .read_preference
            .is_some_and(|pref| pref != ReadPreference::Primary)
        {
            return Err(StoreError::invalid_argument(
                "transactions must read from the primary",
            ));
        }
        self.server.intercept(&Call::Command("startTransaction"))?;
        self.staged = Some(BTreeMap::new());
        Ok(())
    }

    async fn commit_transaction(&mut self) -> StoreResult<()> {
        ensure_usable(&self.closed, &self.identity)?;
        if self.staged.is_none() {
            return Err(StoreError::transaction("no transaction started"));
        }
        self.server.intercept(&Call::Command("commitTransaction"))?;
        let staged = self.staged.take().unwrap_or_default();
        let mut state = lock(&self.server.inner.state);
        for (namespace, collection) in staged {
            *state.collection_mut(&namespace) = collection;
        }
        Ok(())
    }

    async fn abort_transaction(&mut self) -> StoreResult<()> {
        if self.staged.take().is_none() {
            return Err(StoreError::transaction("no transaction started"));
        }
        self.server.intercept(&Call::Command("abortTransaction"))?;
        Ok(())
    }

    async fn execute(
        &mut self,
        namespace: &Namespace,
        operation: Operation,
    ) -> StoreResult<OperationOutcome> {
        ensure_usable(&self.closed, &self.identity)?;
        self.server.intercept(&Call::Operation(operation.kind()))?;
        match self.staged.as_mut() {
            Some(staged) => {
                if !staged.contains_key(namespace) {
                    let snapshot = lock(&self.server.inner.state)
                        .collection(namespace)
                        .cloned()
                        .unwrap_or_default();
                    staged.insert(namespace.clone(), snapshot);
                }
                staged
                    .get_mut(namespace)
                    .ok_or_else(|| StoreError::transaction("staged collection missing"))?
                    .apply(operation)
            }
            None => {
                let mut state = lock(&self.server.inner.state);
                if operation.kind().is_write() {
                    state.collection_mut(namespace).apply(operation)
                } else {
                    state
                        .collection(namespace)
                        .cloned()
                        .unwrap_or_default()
                        .apply(operation)
                }
            }
        }
    }

    fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }
}
