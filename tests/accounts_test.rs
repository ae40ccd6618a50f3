// ABOUTME: Integration tests for the application account store
// ABOUTME: Creation, authentication, updates, role changes, listing, deletion and indexes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use common::TEST_DATABASE;
use docbridge::accounts::{AccountUpdate, NewAccount};
use docbridge::errors::AppError;
use docbridge::models::Role;
use mongodb::bson::doc;

fn analyst(username: &str) -> NewAccount {
    NewAccount::new(
        username,
        format!("{username}@example.com"),
        "energyanalyst",
        "correct horse",
    )
}

#[tokio::test]
async fn test_create_hashes_secret_and_assigns_permissions() {
    let (server, store) = common::account_store().await;

    let account = store.create(analyst("alice")).await.unwrap();

    assert!(account.id.is_some());
    assert_eq!(account.role, Role::EnergyAnalyst);
    assert_eq!(account.permissions, vec!["read".to_owned()]);
    assert!(account.active);
    assert_ne!(account.hashed_password, "correct horse");
    assert!(account.hashed_password.starts_with("$2"));

    let stored = &server.documents(TEST_DATABASE, "users")[0];
    assert_eq!(stored.get_str("username").unwrap(), "alice");
    assert!(stored.contains_key("_created_at"));
    assert!(!stored.contains_key("secret"));
}

#[tokio::test]
async fn test_duplicate_username_is_rejected() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();

    let err = store.create(analyst("alice")).await.unwrap_err();

    assert!(matches!(err, AppError::AlreadyExists(_)), "got {err:?}");
}

#[tokio::test]
async fn test_create_validates_input() {
    let (_server, store) = common::account_store().await;

    let err = store
        .create(NewAccount::new("bob", "bob@example.com", "overlord", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = store
        .create(NewAccount::new(" ", "x@example.com", "viewer", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let err = store
        .create(NewAccount::new("bob", "", "viewer", "pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    assert!(store.list(None, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_authenticate() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();

    assert!(store.authenticate("alice", "correct horse").await);
    assert!(!store.authenticate("alice", "battery staple").await);
    assert!(!store.authenticate("nobody", "correct horse").await);
}

#[tokio::test]
async fn test_inactive_accounts_never_authenticate() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();
    store.create(analyst("bob").inactive()).await.unwrap();

    assert!(!store.authenticate("bob", "correct horse").await);

    assert!(store.deactivate("alice").await.unwrap());
    assert!(!store.authenticate("alice", "correct horse").await);

    assert!(store.activate("alice").await.unwrap());
    assert!(store.authenticate("alice", "correct horse").await);
}

#[tokio::test]
async fn test_update_role_rewrites_permissions() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();

    assert!(store.update_role("alice", "dataengineer").await.unwrap());

    let account = store.get("alice").await.unwrap().unwrap();
    assert_eq!(account.role, Role::DataEngineer);
    assert_eq!(
        account.permissions,
        vec!["readWrite".to_owned(), "dbAdmin".to_owned()]
    );
    assert!(account.updated_at.is_some());

    let err = store.update_role("alice", "overlord").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_update_applies_partial_changes() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();

    let changed = store
        .update(
            "alice",
            AccountUpdate::new()
                .email("alice@corp.example")
                .secret("new secret")
                .metadata(doc! { "site": "north" }),
        )
        .await
        .unwrap();
    assert!(changed);

    let account = store.get("alice").await.unwrap().unwrap();
    assert_eq!(account.email, "alice@corp.example");
    assert_eq!(account.metadata.get_str("site").unwrap(), "north");
    assert_eq!(account.role, Role::EnergyAnalyst);
    assert!(store.authenticate("alice", "new secret").await);
    assert!(!store.authenticate("alice", "correct horse").await);
}

#[tokio::test]
async fn test_update_rejects_invalid_changes() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("alice")).await.unwrap();

    let rename = AccountUpdate {
        username: Some("mallory".to_owned()),
        ..AccountUpdate::new()
    };
    assert!(matches!(
        store.update("alice", rename).await.unwrap_err(),
        AppError::InvalidInput(_)
    ));
    assert!(matches!(
        store.update("alice", AccountUpdate::new()).await.unwrap_err(),
        AppError::InvalidInput(_)
    ));
    assert!(matches!(
        store
            .update("alice", AccountUpdate::new().email("  "))
            .await
            .unwrap_err(),
        AppError::InvalidInput(_)
    ));
    assert!(store.exists("alice").await.unwrap());
    assert!(!store.exists("mallory").await.unwrap());
}

#[tokio::test]
async fn test_update_of_missing_account_reports_no_change() {
    let (_server, store) = common::account_store().await;

    assert!(!store.update_role("ghost", "viewer").await.unwrap());
    assert!(!store.deactivate("ghost").await.unwrap());
}

#[tokio::test]
async fn test_list_is_sorted_and_filterable() {
    let (_server, store) = common::account_store().await;
    store.create(analyst("carol")).await.unwrap();
    store.create(analyst("alice")).await.unwrap();
    store
        .create(NewAccount::new("bob", "bob@example.com", "viewer", "pw").inactive())
        .await
        .unwrap();

    let all: Vec<_> = store
        .list(None, false)
        .await
        .unwrap()
        .into_iter()
        .map(|account| account.username)
        .collect();
    assert_eq!(all, vec!["alice", "bob", "carol"]);

    let active: Vec<_> = store
        .list(None, true)
        .await
        .unwrap()
        .into_iter()
        .map(|account| account.username)
        .collect();
    assert_eq!(active, vec!["alice", "carol"]);

    let viewers = store
        .list(Some(doc! { "role": "viewer" }), false)
        .await
        .unwrap();
    assert_eq!(viewers.len(), 1);
    assert_eq!(viewers[0].username, "bob");
}

#[tokio::test]
async fn test_get_by_id() {
    let (_server, store) = common::account_store().await;
    let created = store.create(analyst("alice")).await.unwrap();

    let found = store
        .get_by_id(created.id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.username, "alice");
    assert_eq!(found.id, created.id);
}

#[tokio::test]
async fn test_delete_and_purge() {
    let (_server, store) = common::account_store().await;
    for name in ["alice", "bob", "carol"] {
        store.create(analyst(name)).await.unwrap();
    }

    assert!(store.delete("alice").await.unwrap());
    assert!(!store.delete("alice").await.unwrap());
    assert!(store.get("alice").await.unwrap().is_none());

    assert_eq!(store.purge_all().await.unwrap(), 2);
    assert_eq!(store.purge_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_ensure_indexes() {
    let (server, store) = common::account_store().await;

    let names = store.ensure_indexes().await.unwrap();

    assert_eq!(names, vec!["username_1", "email_1", "role_1"]);
    let existing = server.index_names(TEST_DATABASE, "users");
    for name in &names {
        assert!(existing.contains(name), "missing index {name}");
    }
    // Idempotent
    assert_eq!(store.ensure_indexes().await.unwrap(), names);
}

#[test]
fn test_debug_output_redacts_secrets() {
    let account = analyst("alice");
    let rendered = format!("{account:?}");
    assert!(!rendered.contains("correct horse"));
    assert!(rendered.contains("[REDACTED]"));
}
