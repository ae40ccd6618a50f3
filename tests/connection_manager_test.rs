// ABOUTME: Integration tests for the connection manager lifecycle
// ABOUTME: Covers connect, liveness reconnects, authentication fallback, registry lifetimes and transactions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{auth_config, fast_retry, init_test_logging, manager_for, test_config, TEST_DATABASE};
use docbridge::errors::{AppError, AppResult, StoreError};
use docbridge::manager::{ConnectionManager, ConnectionRegistry, LifecycleState, Lifetime};
use docbridge::models::{OperationStatus, PrincipalRole};
use docbridge::store::{Fault, FaultTarget, MemoryServer, TransactionOptions};
use mongodb::bson::doc;

#[tokio::test]
async fn test_connect_reaches_connected() {
    init_test_logging();
    let server = MemoryServer::new();
    let manager = manager_for(&server, test_config());
    assert_eq!(manager.state(), LifecycleState::Disconnected);

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Connected);
    assert!(manager.is_connected());
    assert_eq!(server.connect_count(), 1);
    assert_eq!(server.live_clients(), 1);

    let history = manager.recent_operations();
    let last = history.last().unwrap();
    assert_eq!(last.verb, "connect");
    assert_eq!(last.status, OperationStatus::Succeeded);
}

#[tokio::test]
async fn test_connect_is_idempotent() {
    init_test_logging();
    let server = MemoryServer::new();
    let manager = manager_for(&server, test_config());

    manager.connect().await.unwrap();
    manager.connect().await.unwrap();
    manager.get_client().await.unwrap();

    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_establishment() {
    init_test_logging();
    let server = MemoryServer::new();
    let manager = manager_for(&server, test_config());

    let (a, b, c) = tokio::join!(
        manager.get_client(),
        manager.get_client(),
        manager.get_client()
    );
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_transient_connect_failures_are_retried() {
    init_test_logging();
    let server = MemoryServer::new();
    server.inject(Fault::new(FaultTarget::Connect, StoreError::network("connection refused")).times(2));
    let manager = manager_for(&server, test_config());

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Connected);
    assert_eq!(server.connect_count(), 3);
}

#[tokio::test]
async fn test_connect_gives_up_after_max_attempts() {
    init_test_logging();
    let server = MemoryServer::new();
    server.inject(
        Fault::new(FaultTarget::Connect, StoreError::server_selection("no primary available")).times(10),
    );
    let manager = manager_for(&server, test_config());

    let err = manager.connect().await.unwrap_err();

    match &err {
        AppError::RetriesExhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(manager.state(), LifecycleState::Disconnected);
    assert_eq!(server.connect_count(), 3);
    assert_eq!(server.live_clients(), 0);

    let last = manager.recent_operations().pop().unwrap();
    assert_eq!(last.status, OperationStatus::Failed);
    assert_eq!(last.attempts, 3);
}

#[tokio::test]
async fn test_invalid_parameters_fail_without_retry() {
    init_test_logging();
    let server = MemoryServer::new();
    server.inject(
        Fault::new(FaultTarget::Connect, StoreError::invalid_argument("unknown option")).times(10),
    );
    let manager = manager_for(&server, test_config());

    let err = manager.connect().await.unwrap_err();

    assert!(matches!(err, AppError::Config(_)), "got {err:?}");
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_fall_back_to_unauthenticated() {
    init_test_logging();
    let server = MemoryServer::new();
    server.set_enforce_authentication(true);
    let manager = manager_for(&server, auth_config("admin", "wrong-password"));

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::ConnectedNoAuth);
    assert!(manager.is_connected());
    assert!(manager.config().enable_auth());
    let effective = manager.effective_config();
    assert!(!effective.enable_auth());
    assert!(!effective.connection_string().contains('@'));
    // The rejected client is released
    assert_eq!(server.live_clients(), 1);
}

#[tokio::test]
async fn test_rejected_credentials_without_fallback() {
    init_test_logging();
    let server = MemoryServer::new();
    server.set_enforce_authentication(true);
    let config = auth_config("admin", "wrong-password")
        .to_builder()
        .allow_unauthenticated_fallback(false)
        .build()
        .unwrap();
    let manager = manager_for(&server, config);

    let err = manager.connect().await.unwrap_err();

    assert!(err.is_authorization(), "got {err:?}");
    assert_eq!(manager.state(), LifecycleState::Disconnected);
    assert_eq!(server.connect_count(), 1);
    assert_eq!(server.live_clients(), 0);
}

#[tokio::test]
async fn test_valid_credentials_connect_authenticated() {
    init_test_logging();
    let server = MemoryServer::new();
    server.set_enforce_authentication(true);
    server.add_principal(
        "admin",
        "admin",
        "s3cret",
        vec![PrincipalRole::new("root", "admin")],
    );
    let manager = manager_for(&server, auth_config("admin", "s3cret"));

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Connected);
    assert!(manager.effective_config().enable_auth());
}

#[tokio::test]
async fn test_connect_provisions_admin_principal() {
    init_test_logging();
    let server = MemoryServer::new();
    let config = auth_config("root_user", "pw-1")
        .to_builder()
        .provision_admin_principal(true)
        .build()
        .unwrap();
    let manager = manager_for(&server, config);

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::Connected);
    let principal = server.principal("admin", "root_user").unwrap();
    assert!(principal
        .roles
        .iter()
        .any(|grant| grant.role == "root" && grant.db == "admin"));
}

#[tokio::test]
async fn test_rejected_provisioning_takes_the_fallback_path() {
    init_test_logging();
    let server = MemoryServer::new();
    server.inject(Fault::new(
        FaultTarget::command("createUser"),
        StoreError::unauthorized("not authorized on admin to execute command { createUser }"),
    ));
    let config = auth_config("root_user", "pw-1")
        .to_builder()
        .provision_admin_principal(true)
        .build()
        .unwrap();
    let manager = manager_for(&server, config);

    manager.connect().await.unwrap();

    assert_eq!(manager.state(), LifecycleState::ConnectedNoAuth);
    assert!(server.principal("admin", "root_user").is_none());
}

#[tokio::test]
async fn test_failed_liveness_check_reconnects() {
    let (server, manager, _executor) = common::setup().await;
    server.inject(Fault::new(
        FaultTarget::command("ping"),
        StoreError::network("connection reset by peer"),
    ));

    manager.get_client().await.unwrap();

    assert_eq!(server.connect_count(), 2);
    assert_eq!(server.live_clients(), 1);
    assert_eq!(manager.state(), LifecycleState::Connected);
    assert!(manager
        .recent_operations()
        .iter()
        .any(|record| record.verb == "reconnect"));
}

#[tokio::test]
async fn test_fatal_liveness_failure_is_surfaced() {
    let (server, manager, _executor) = common::setup().await;
    server.inject(Fault::new(FaultTarget::command("ping"), StoreError::command("ping disabled")));

    let err = manager.get_client().await.err().unwrap();

    assert!(matches!(err, AppError::Store { .. }), "got {err:?}");
    assert_eq!(server.connect_count(), 1);
}

#[tokio::test]
async fn test_close_is_idempotent_and_reconnects_on_demand() {
    let (server, manager, _executor) = common::setup().await;

    manager.close();
    manager.close();

    assert_eq!(manager.state(), LifecycleState::Disconnected);
    assert_eq!(server.live_clients(), 0);
    let closes = manager
        .recent_operations()
        .iter()
        .filter(|record| record.verb == "close")
        .count();
    assert_eq!(closes, 1);

    manager.get_client().await.unwrap();
    assert_eq!(server.connect_count(), 2);
    assert_eq!(manager.state(), LifecycleState::Connected);
}

#[tokio::test]
async fn test_dropping_manager_releases_client() {
    init_test_logging();
    let server = MemoryServer::new();
    {
        let manager = ConnectionManager::new(
            test_config(),
            Arc::new(server.connector()),
            Lifetime::Scoped,
        );
        manager.connect().await.unwrap();
        assert_eq!(server.live_clients(), 1);
    }
    assert_eq!(server.live_clients(), 0);
}

#[tokio::test]
async fn test_registry_shares_one_manager() {
    init_test_logging();
    let server = MemoryServer::new();
    let registry =
        ConnectionRegistry::new(Arc::new(server.connector())).with_retry_policy(fast_retry(3));
    assert!(registry.shared_if_initialized().is_none());

    let first = registry.shared(&test_config()).await.unwrap();
    let second = registry.shared(&test_config()).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.lifetime(), Lifetime::Shared);
    assert_eq!(server.connect_count(), 1);
    assert!(registry.shared_if_initialized().is_some());
}

#[tokio::test]
async fn test_registry_retries_failed_shared_initialisation() {
    init_test_logging();
    let server = MemoryServer::new();
    server.inject(
        Fault::new(FaultTarget::Connect, StoreError::network("connection refused")).times(3),
    );
    let registry =
        ConnectionRegistry::new(Arc::new(server.connector())).with_retry_policy(fast_retry(3));

    assert!(registry.shared(&test_config()).await.is_err());
    assert!(registry.shared_if_initialized().is_none());

    let manager = registry.shared(&test_config()).await.unwrap();
    assert!(manager.is_connected());
}

#[tokio::test]
async fn test_scoped_connection_closes_on_drop() {
    init_test_logging();
    let server = MemoryServer::new();
    let registry =
        ConnectionRegistry::new(Arc::new(server.connector())).with_retry_policy(fast_retry(3));

    {
        let scoped = registry.scoped(&test_config()).await.unwrap();
        assert_eq!(scoped.lifetime(), Lifetime::Scoped);
        assert!(scoped.is_connected());
        assert_eq!(server.live_clients(), 1);
    }

    assert_eq!(server.live_clients(), 0);
    assert!(registry.shared_if_initialized().is_none());
}

#[tokio::test]
async fn test_acquire_honours_requested_lifetime() {
    init_test_logging();
    let server = MemoryServer::new();
    let registry =
        ConnectionRegistry::new(Arc::new(server.connector())).with_retry_policy(fast_retry(3));

    let shared = registry.acquire(&test_config(), Lifetime::Shared).await.unwrap();
    let scoped = registry.acquire(&test_config(), Lifetime::Scoped).await.unwrap();

    assert_eq!(shared.manager().lifetime(), Lifetime::Shared);
    assert_eq!(scoped.manager().lifetime(), Lifetime::Scoped);
    assert_eq!(server.live_clients(), 2);

    drop(scoped);
    drop(shared);
    // The shared manager outlives its lease
    assert_eq!(server.live_clients(), 1);
}

#[tokio::test]
async fn test_run_command_is_recorded() {
    let (_server, manager, _executor) = common::setup().await;

    let reply = manager
        .run_command(Some("admin"), doc! { "ping": 1 })
        .await
        .unwrap();

    assert_eq!(reply.get_f64("ok").unwrap(), 1.0);
    let last = manager.recent_operations().pop().unwrap();
    assert_eq!(last.verb, "ping");
    assert_eq!(last.target, "admin");
    assert_eq!(last.attempts, 1);
}

#[tokio::test]
async fn test_history_is_bounded() {
    init_test_logging();
    let server = MemoryServer::new();
    let manager = Arc::new(
        ConnectionManager::new(test_config(), Arc::new(server.connector()), Lifetime::Scoped)
            .with_retry_policy(fast_retry(3))
            .with_history_capacity(2),
    );
    manager.connect().await.unwrap();
    for _ in 0..4 {
        manager.run_command(None, doc! { "dbStats": 1 }).await.unwrap();
    }

    let history = manager.recent_operations();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|record| record.verb == "dbStats"));
}

#[tokio::test]
async fn test_transaction_commits_on_success() {
    let (server, manager, _executor) = common::setup().await;

    let id = manager
        .run_transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                let id = tx.insert_one("ledger", doc! { "amount": 10 }).await?;
                tx.insert_one("ledger", doc! { "amount": -10 }).await?;
                Ok(id)
            })
        })
        .await
        .unwrap();

    let stored = server.documents(TEST_DATABASE, "ledger");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].get("_id"), Some(&id));
}

#[tokio::test]
async fn test_transaction_aborts_on_error() {
    let (server, manager, _executor) = common::setup().await;

    let result: AppResult<()> = manager
        .run_transaction(TransactionOptions::default(), |tx| {
            Box::pin(async move {
                tx.insert_one("ledger", doc! { "amount": 10 }).await?;
                Err(AppError::invalid_input("insufficient funds"))
            })
        })
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert!(server.documents(TEST_DATABASE, "ledger").is_empty());
}

#[tokio::test]
async fn test_finished_transaction_rejects_further_use() {
    let (server, manager, _executor) = common::setup().await;

    let mut tx = manager.transaction(TransactionOptions::default()).await.unwrap();
    tx.insert_one("ledger", doc! { "amount": 1 }).await.unwrap();
    assert!(server.documents(TEST_DATABASE, "ledger").is_empty());
    tx.commit().await.unwrap();
    assert_eq!(server.documents(TEST_DATABASE, "ledger").len(), 1);

    let err = tx.insert_one("ledger", doc! { "amount": 2 }).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_dropped_transaction_discards_writes() {
    let (server, manager, _executor) = common::setup().await;

    {
        let mut tx = manager.transaction(TransactionOptions::default()).await.unwrap();
        tx.insert_one("ledger", doc! { "amount": 1 }).await.unwrap();
    }

    assert!(server.documents(TEST_DATABASE, "ledger").is_empty());
}
