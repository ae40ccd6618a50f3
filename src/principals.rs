// ABOUTME: Reconciles server-level authentication principals against a desired state
// ABOUTME: Probe-first create/update/ensure_exists/delete with distinguishable mismatch errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! Principal reconciliation
//!
//! Every action first probes for the principal with `usersInfo` in the target
//! authentication database. A probe rejected for lack of privileges counts as
//! "absent" so that a freshly started server without any principal can be
//! bootstrapped. The administrative command that follows is not given the
//! same leniency: an authorization failure there is surfaced to the caller.
//!
//! A reconciler built on a [`ConnectionManager`] asks it for the client on
//! every command, so reconnects and retries apply to principal administration
//! like any other command.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use mongodb::bson::{doc, Bson, Document};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult, ReconciliationError, StoreErrorKind};
use crate::manager::ConnectionManager;
use crate::models::{Principal, PrincipalRole, ReconcileAction, ReconcileOutcome};
use crate::store::DocumentClient;

/// Desired state of one principal
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrincipalSpec {
    /// Principal name
    pub username: String,
    /// Secret; required when the principal has to be created
    pub secret: Option<String>,
    /// Role grants; required by every action except delete
    pub roles: Vec<PrincipalRole>,
    /// Authentication database; the reconciler default when absent
    pub database: Option<String>,
    /// Extra user options merged into the command (e.g. `customData`)
    pub options: Document,
}

impl PrincipalSpec {
    /// Spec for `username` with no secret, roles or options
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Set the secret
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Set the role grants
    #[must_use]
    pub fn roles(mut self, roles: Vec<PrincipalRole>) -> Self {
        self.roles = roles;
        self
    }

    /// Target a specific authentication database
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Attach an extra user option
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Where administrative commands are sent
#[derive(Clone)]
enum CommandRoute {
    Manager(Arc<ConnectionManager>),
    // Only used while the manager itself is establishing the client
    Client(Arc<dyn DocumentClient>),
}

impl CommandRoute {
    // Boxed: the manager route leads back into connect, which reconciles.
    fn run<'a>(&'a self, database: &'a str, command: Document) -> BoxFuture<'a, AppResult<Document>> {
        match self {
            Self::Manager(manager) => Box::pin(manager.run_command(Some(database), command)),
            Self::Client(client) => Box::pin(async move {
                let name = command.keys().next().cloned().unwrap_or_default();
                client
                    .run_command(database, command)
                    .await
                    .map_err(|e| AppError::store(name, e))
            }),
        }
    }
}

/// Reconciles principals through a [`ConnectionManager`]
#[derive(Clone)]
pub struct PrincipalReconciler {
    route: CommandRoute,
    default_database: String,
}

impl PrincipalReconciler {
    /// Reconciler over `manager`, targeting its authentication database when
    /// a spec names none
    #[must_use]
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        let default_database = manager.config().auth_source().to_owned();
        Self {
            route: CommandRoute::Manager(manager),
            default_database,
        }
    }

    /// Reconciler bound to one client handle, without retries or reconnects
    pub(crate) fn with_client(
        client: Arc<dyn DocumentClient>,
        default_database: impl Into<String>,
    ) -> Self {
        Self {
            route: CommandRoute::Client(client),
            default_database: default_database.into(),
        }
    }

    /// Database a spec resolves to
    fn database_for<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested.unwrap_or(&self.default_database)
    }

    /// Run `action` by name
    ///
    /// # Errors
    ///
    /// [`ReconciliationError::InvalidAction`] for an unknown name, otherwise
    /// as [`reconcile`](Self::reconcile)
    pub async fn reconcile_named(
        &self,
        action: &str,
        spec: &PrincipalSpec,
    ) -> AppResult<ReconcileOutcome> {
        let action: ReconcileAction = action.parse()?;
        self.reconcile(action, spec).await
    }

    /// Drive the principal described by `spec` towards `action`
    ///
    /// # Errors
    ///
    /// - [`ReconciliationError::AlreadyExists`] when creating a present principal
    /// - [`ReconciliationError::NotFound`] when updating or deleting an absent one
    /// - [`AppError::InvalidInput`] when a required secret or role list is missing
    /// - [`AppError::Authorization`] when the administrative command is rejected
    pub async fn reconcile(
        &self,
        action: ReconcileAction,
        spec: &PrincipalSpec,
    ) -> AppResult<ReconcileOutcome> {
        if spec.username.trim().is_empty() {
            return Err(AppError::invalid_input("Principal name must not be empty"));
        }
        let database = self.database_for(spec.database.as_deref()).to_owned();
        let exists = self.principal_exists(&spec.username, Some(&database)).await?;
        let mut outcome = ReconcileOutcome::new(action, &spec.username, &database);

        match action {
            ReconcileAction::Create => {
                if exists {
                    return Err(already_exists(&spec.username, &database));
                }
                self.create_principal(spec, &database).await?;
                outcome.created = true;
            }
            ReconcileAction::Update => {
                if !exists {
                    return Err(not_found(&spec.username, &database));
                }
                self.update_principal(spec, &database).await?;
                outcome.updated = true;
            }
            ReconcileAction::EnsureExists => {
                if exists {
                    self.update_principal(spec, &database).await?;
                    outcome.updated = true;
                } else {
                    match self.create_principal(spec, &database).await {
                        Ok(()) => outcome.created = true,
                        // Created concurrently, or hidden by an unauthorized usersInfo
                        Err(e) if e.is_already_exists() => {
                            warn!(
                                principal = %spec.username,
                                database = %database,
                                "Principal already present; updating instead"
                            );
                            self.update_principal(spec, &database).await?;
                            outcome.updated = true;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
            ReconcileAction::Delete => {
                if !exists {
                    return Err(not_found(&spec.username, &database));
                }
                self.admin_command(
                    "dropUser",
                    &spec.username,
                    &database,
                    doc! { "dropUser": spec.username.clone() },
                )
                .await?;
                outcome.deleted = true;
            }
        }

        info!(
            action = %action,
            principal = %spec.username,
            database = %database,
            created = outcome.created,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "Principal reconciled"
        );
        Ok(outcome)
    }

    /// Create; fails if present
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile)
    pub async fn create(&self, spec: &PrincipalSpec) -> AppResult<ReconcileOutcome> {
        self.reconcile(ReconcileAction::Create, spec).await
    }

    /// Replace roles; fails if absent
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile)
    pub async fn update(&self, spec: &PrincipalSpec) -> AppResult<ReconcileOutcome> {
        self.reconcile(ReconcileAction::Update, spec).await
    }

    /// Create if absent, otherwise replace roles
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile)
    pub async fn ensure_exists(&self, spec: &PrincipalSpec) -> AppResult<ReconcileOutcome> {
        self.reconcile(ReconcileAction::EnsureExists, spec).await
    }

    /// Drop; fails if absent
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile)
    pub async fn delete(
        &self,
        username: &str,
        database: Option<&str>,
    ) -> AppResult<ReconcileOutcome> {
        let mut spec = PrincipalSpec::new(username);
        spec.database = database.map(str::to_owned);
        self.reconcile(ReconcileAction::Delete, &spec).await
    }

    /// Whether the principal exists; an unauthorized probe reports `false`
    ///
    /// # Errors
    ///
    /// Any probe failure other than an authorization rejection
    pub async fn principal_exists(&self, username: &str, database: Option<&str>) -> AppResult<bool> {
        let database = self.database_for(database);
        match self
            .route
            .run(database, doc! { "usersInfo": { "user": username, "db": database } })
            .await
        {
            Ok(reply) => Ok(reply
                .get_array("users")
                .is_ok_and(|users| !users.is_empty())),
            Err(e) if e.is_authorization() => {
                warn!(
                    principal = %username,
                    database = %database,
                    error = %e,
                    "Not authorized to probe principal; treating as absent"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Every principal of an authentication database
    ///
    /// # Errors
    ///
    /// Returns an error if the listing command fails
    pub async fn list_principals(&self, database: Option<&str>) -> AppResult<Vec<Principal>> {
        let database = self.database_for(database);
        let reply = self.route.run(database, doc! { "usersInfo": 1 }).await?;
        let users = reply.get_array("users").map_err(|e| {
            AppError::serialization(format!("usersInfo reply without users: {e}"))
        })?;
        Ok(users
            .iter()
            .filter_map(Bson::as_document)
            .filter_map(|user| principal_from_document(user, database))
            .collect())
    }

    async fn create_principal(&self, spec: &PrincipalSpec, database: &str) -> AppResult<()> {
        let secret = spec
            .secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::invalid_input(format!(
                    "A secret is required to create principal '{}'",
                    spec.username
                ))
            })?;
        require_roles(spec)?;
        let mut command = doc! {
            "createUser": spec.username.clone(),
            "pwd": secret,
            "roles": roles_to_bson(&spec.roles),
        };
        merge_options(&mut command, &spec.options);
        self.admin_command("createUser", &spec.username, database, command)
            .await
    }

    async fn update_principal(&self, spec: &PrincipalSpec, database: &str) -> AppResult<()> {
        require_roles(spec)?;
        let mut command = doc! {
            "updateUser": spec.username.clone(),
            "roles": roles_to_bson(&spec.roles),
        };
        merge_options(&mut command, &spec.options);
        self.admin_command("updateUser", &spec.username, database, command)
            .await
    }

    async fn admin_command(
        &self,
        name: &str,
        username: &str,
        database: &str,
        command: Document,
    ) -> AppResult<()> {
        self.route
            .run(database, command)
            .await
            .map_err(|e| map_admin_error(name, username, database, e))?;
        Ok(())
    }
}

fn require_roles(spec: &PrincipalSpec) -> AppResult<()> {
    if spec.roles.is_empty() {
        return Err(AppError::invalid_input(format!(
            "At least one role is required for principal '{}'",
            spec.username
        )));
    }
    Ok(())
}

fn roles_to_bson(roles: &[PrincipalRole]) -> Vec<Bson> {
    roles
        .iter()
        .map(|grant| Bson::Document(doc! { "role": grant.role.clone(), "db": grant.db.clone() }))
        .collect()
}

// Reserved command keys are never overridden by free-form options.
fn merge_options(command: &mut Document, options: &Document) {
    for (key, value) in options {
        if !command.contains_key(key) {
            command.insert(key.clone(), value.clone());
        }
    }
}

fn already_exists(principal: &str, database: &str) -> AppError {
    ReconciliationError::AlreadyExists {
        principal: principal.to_owned(),
        database: database.to_owned(),
    }
    .into()
}

fn not_found(principal: &str, database: &str) -> AppError {
    ReconciliationError::NotFound {
        principal: principal.to_owned(),
        database: database.to_owned(),
    }
    .into()
}

fn map_admin_error(command: &str, principal: &str, database: &str, error: AppError) -> AppError {
    match error.store_error().map(|e| e.kind) {
        Some(StoreErrorKind::UserAlreadyExists) => already_exists(principal, database),
        Some(StoreErrorKind::UserNotFound) => not_found(principal, database),
        _ => match error {
            AppError::Store { source, .. } => {
                AppError::store(format!("{command} {database}.{principal}"), source)
            }
            other => other,
        },
    }
}

fn principal_from_document(user: &Document, fallback_db: &str) -> Option<Principal> {
    let username = user.get_str("user").ok()?.to_owned();
    let database = user.get_str("db").unwrap_or(fallback_db).to_owned();
    let roles = user
        .get_array("roles")
        .map(|roles| {
            roles
                .iter()
                .filter_map(Bson::as_document)
                .filter_map(|grant| {
                    Some(PrincipalRole::new(grant.get_str("role").ok()?, grant.get_str("db").ok()?))
                })
                .collect()
        })
        .unwrap_or_default();
    Some(Principal {
        username,
        database,
        roles,
    })
}
