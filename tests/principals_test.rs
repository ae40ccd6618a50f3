// ABOUTME: Integration tests for database principal reconciliation
// ABOUTME: Create, update, ensure-exists and delete semantics plus authorization handling
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use docbridge::errors::{AppError, ReconciliationError, StoreError};
use docbridge::manager::LifecycleState;
use docbridge::models::{PrincipalRole, ReconcileAction};
use docbridge::principals::{PrincipalReconciler, PrincipalSpec};
use docbridge::store::{Fault, FaultTarget, MemoryServer};
use mongodb::bson::doc;

fn reporting_user() -> PrincipalSpec {
    PrincipalSpec::new("reporting")
        .secret("r3port")
        .roles(vec![PrincipalRole::new("read", "analytics")])
}

async fn reconciler() -> (MemoryServer, PrincipalReconciler) {
    let (server, manager, _executor) = common::setup().await;
    (server, PrincipalReconciler::new(manager))
}

#[tokio::test]
async fn test_create_then_duplicate_create() {
    let (server, reconciler) = reconciler().await;

    let outcome = reconciler.create(&reporting_user()).await.unwrap();
    assert!(outcome.created);
    assert_eq!(outcome.action, ReconcileAction::Create);
    assert_eq!(outcome.principal, "reporting");
    // Without an explicit database the manager's authentication database is used
    assert_eq!(outcome.database, "admin");

    let stored = server.principal("admin", "reporting").unwrap();
    assert_eq!(stored.roles, vec![PrincipalRole::new("read", "analytics")]);

    let err = reconciler.create(&reporting_user()).await.unwrap_err();
    assert!(err.is_already_exists());
    assert!(matches!(
        err.reconciliation(),
        Some(ReconciliationError::AlreadyExists { principal, database })
            if principal == "reporting" && database == "admin"
    ));
}

#[tokio::test]
async fn test_update_replaces_roles() {
    let (server, reconciler) = reconciler().await;
    reconciler.create(&reporting_user()).await.unwrap();

    let spec = PrincipalSpec::new("reporting").roles(vec![
        PrincipalRole::new("readWrite", "analytics"),
        PrincipalRole::new("read", "billing"),
    ]);
    let outcome = reconciler.update(&spec).await.unwrap();

    assert!(outcome.updated);
    assert!(!outcome.created);
    let stored = server.principal("admin", "reporting").unwrap();
    assert_eq!(stored.roles.len(), 2);
    assert!(stored.roles.iter().all(|grant| grant.role != "read" || grant.db == "billing"));
}

#[tokio::test]
async fn test_update_and_delete_of_missing_principal() {
    let (_server, reconciler) = reconciler().await;

    let err = reconciler.update(&reporting_user()).await.unwrap_err();
    assert!(err.is_not_found());

    let err = reconciler.delete("reporting", None).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Reconciliation(ReconciliationError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_ensure_exists_is_idempotent() {
    let (server, reconciler) = reconciler().await;

    let first = reconciler.ensure_exists(&reporting_user()).await.unwrap();
    assert!(first.created);
    assert!(!first.updated);

    let second = reconciler.ensure_exists(&reporting_user()).await.unwrap();
    assert!(!second.created);
    assert!(second.updated);

    assert!(server.principal("admin", "reporting").is_some());
    assert_eq!(server.command_count("createUser"), 1);
}

#[tokio::test]
async fn test_delete_removes_principal() {
    let (server, reconciler) = reconciler().await;
    reconciler.create(&reporting_user()).await.unwrap();

    let outcome = reconciler.delete("reporting", None).await.unwrap();

    assert!(outcome.deleted);
    assert!(server.principal("admin", "reporting").is_none());
    assert!(!reconciler.principal_exists("reporting", None).await.unwrap());
}

#[tokio::test]
async fn test_explicit_database_is_honoured() {
    let (server, reconciler) = reconciler().await;
    let spec = reporting_user().database("analytics");

    reconciler.create(&spec).await.unwrap();

    assert!(server.principal("analytics", "reporting").is_some());
    assert!(server.principal("admin", "reporting").is_none());
    assert!(reconciler
        .principal_exists("reporting", Some("analytics"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_create_requires_secret_and_roles() {
    let (_server, reconciler) = reconciler().await;

    let no_secret = PrincipalSpec::new("reporting").roles(vec![PrincipalRole::new("read", "analytics")]);
    let err = reconciler.create(&no_secret).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let no_roles = PrincipalSpec::new("reporting").secret("r3port");
    let err = reconciler.create(&no_roles).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let blank = PrincipalSpec::new("  ").secret("x");
    let err = reconciler.create(&blank).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_named_actions() {
    let (_server, reconciler) = reconciler().await;

    let outcome = reconciler
        .reconcile_named("ensure_exists", &reporting_user())
        .await
        .unwrap();
    assert!(outcome.created);

    let err = reconciler
        .reconcile_named("promote", &reporting_user())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Reconciliation(ReconciliationError::InvalidAction { ref action }) if action == "promote"
    ));
}

#[tokio::test]
async fn test_options_are_forwarded() {
    let (server, reconciler) = reconciler().await;
    let spec = reporting_user().option("customData", doc! { "team": "finance" });

    reconciler.create(&spec).await.unwrap();

    let listed = reconciler.list_principals(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].username, "reporting");
    assert!(server.principal("admin", "reporting").is_some());
}

#[tokio::test]
async fn test_unauthorized_lookup_reads_as_absent_but_writes_fail() {
    let (server, reconciler) = reconciler().await;
    server.set_restrict_user_admin(true);

    assert!(!reconciler.principal_exists("reporting", None).await.unwrap());

    let err = reconciler.create(&reporting_user()).await.unwrap_err();
    assert!(err.is_authorization(), "got {err:?}");
    assert!(server.principal("admin", "reporting").is_none());
}

#[tokio::test]
async fn test_reconciler_follows_manager_reconnects() {
    let (server, manager, _executor) = common::setup().await;
    let reconciler = PrincipalReconciler::new(Arc::clone(&manager));
    server.inject(Fault::new(
        FaultTarget::command("ping"),
        StoreError::network("connection reset by peer"),
    ));
    manager.get_client().await.unwrap();
    assert_eq!(server.connect_count(), 2);
    assert_eq!(manager.state(), LifecycleState::Connected);

    let outcome = reconciler.ensure_exists(&reporting_user()).await.unwrap();

    assert!(outcome.created);
    assert!(server.principal("admin", "reporting").is_some());
}

#[tokio::test]
async fn test_reconciler_reconnects_after_close() {
    let (server, manager, _executor) = common::setup().await;
    let reconciler = PrincipalReconciler::new(Arc::clone(&manager));
    manager.close();

    reconciler.create(&reporting_user()).await.unwrap();

    assert!(server.principal("admin", "reporting").is_some());
    assert_eq!(manager.state(), LifecycleState::Connected);
}

#[tokio::test]
async fn test_transient_lookup_failures_are_retried() {
    let (server, reconciler) = reconciler().await;
    server.inject(
        Fault::new(
            FaultTarget::command("usersInfo"),
            StoreError::network("socket closed"),
        )
        .times(2),
    );

    let outcome = reconciler.ensure_exists(&reporting_user()).await.unwrap();

    assert!(outcome.created);
    assert_eq!(server.command_count("usersInfo"), 3);
}

#[tokio::test]
async fn test_ensure_exists_updates_principal_hidden_from_lookup() {
    let (server, reconciler) = reconciler().await;
    server.add_principal("admin", "reporting", "old", vec![PrincipalRole::new("read", "x")]);
    server.inject(Fault::new(
        FaultTarget::command("usersInfo"),
        StoreError::unauthorized("not authorized on admin to execute command usersInfo"),
    ));

    let outcome = reconciler.ensure_exists(&reporting_user()).await.unwrap();

    assert!(!outcome.created);
    assert!(outcome.updated);
    let stored = server.principal("admin", "reporting").unwrap();
    assert_eq!(stored.roles, vec![PrincipalRole::new("read", "analytics")]);
}

#[tokio::test]
async fn test_create_still_rejects_principal_hidden_from_lookup() {
    let (server, reconciler) = reconciler().await;
    server.add_principal("admin", "reporting", "old", vec![PrincipalRole::new("read", "x")]);
    server.inject(Fault::new(
        FaultTarget::command("usersInfo"),
        StoreError::unauthorized("not authorized on admin to execute command usersInfo"),
    ));

    let err = reconciler.create(&reporting_user()).await.unwrap_err();

    assert!(err.is_already_exists(), "got {err:?}");
    let stored = server.principal("admin", "reporting").unwrap();
    assert_eq!(stored.roles, vec![PrincipalRole::new("read", "x")]);
}
