// ABOUTME: Integration tests for the administrative command wrappers
// ABOUTME: Database and collection listing, drops, statistics and index creation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::TEST_DATABASE;
use docbridge::admin::AdminOps;
use docbridge::errors::StoreError;
use docbridge::store::{Fault, FaultTarget, IndexSpec};
use mongodb::bson::doc;

#[tokio::test]
async fn test_list_databases_and_collections() {
    let (_server, manager, executor) = common::setup().await;
    executor.insert_one("alpha", doc! { "n": 1 }).await.unwrap();
    executor.insert_one("beta", doc! { "n": 1 }).await.unwrap();
    executor
        .insert_one(
            docbridge::executor::CollectionRef::in_database("archive", "old"),
            doc! { "n": 1 },
        )
        .await
        .unwrap();
    let admin = AdminOps::new(Arc::clone(&manager));

    let databases = admin.list_databases().await.unwrap();
    assert!(databases.contains(&TEST_DATABASE.to_owned()));
    assert!(databases.contains(&"archive".to_owned()));

    let mut collections = admin.list_collections(None).await.unwrap();
    collections.sort();
    assert_eq!(collections, vec!["alpha", "beta"]);
    assert_eq!(admin.list_collections(Some("archive")).await.unwrap(), vec!["old"]);
    assert!(admin.list_collections(Some("nowhere")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_drop_collection_and_database() {
    let (server, manager, executor) = common::setup().await;
    executor.insert_one("alpha", doc! { "n": 1 }).await.unwrap();
    executor.insert_one("beta", doc! { "n": 1 }).await.unwrap();
    let admin = AdminOps::new(manager);

    admin.drop_collection("alpha", None).await.unwrap();
    assert_eq!(server.collection_names(TEST_DATABASE), vec!["beta"]);

    // Dropping a missing collection is not an error
    admin.drop_collection("alpha", None).await.unwrap();

    admin.drop_database(TEST_DATABASE).await.unwrap();
    assert!(server.collection_names(TEST_DATABASE).is_empty());
    assert!(!admin
        .list_databases()
        .await
        .unwrap()
        .contains(&TEST_DATABASE.to_owned()));
}

#[tokio::test]
async fn test_statistics() {
    let (_server, manager, executor) = common::setup().await;
    executor
        .insert_many("alpha", vec![doc! { "n": 1 }, doc! { "n": 2 }])
        .await
        .unwrap();
    let admin = AdminOps::new(manager);

    let status = admin.server_status().await.unwrap();
    assert_eq!(status.get_f64("ok").unwrap(), 1.0);

    let db_stats = admin.database_stats(None).await.unwrap();
    assert_eq!(db_stats.get_str("db").unwrap(), TEST_DATABASE);
    assert_eq!(db_stats.get_i64("collections").unwrap(), 1);
    assert_eq!(db_stats.get_i64("objects").unwrap(), 2);

    let coll_stats = admin.collection_stats("alpha", None).await.unwrap();
    assert_eq!(coll_stats.get_i64("count").unwrap(), 2);

    assert!(admin.collection_stats("missing", None).await.is_err());
}

#[tokio::test]
async fn test_create_index() {
    let (server, manager, _executor) = common::setup().await;
    let admin = AdminOps::new(manager);

    let name = admin
        .create_index(
            "readings",
            None,
            IndexSpec::new(doc! { "meter": 1, "at": -1 }),
        )
        .await
        .unwrap();

    assert_eq!(name, "meter_1_at_-1");
    assert!(server
        .index_names(TEST_DATABASE, "readings")
        .contains(&name));
}

#[tokio::test]
async fn test_commands_are_retried_on_transient_failures() {
    let (server, manager, _executor) = common::setup().await;
    server.inject(
        Fault::new(
            FaultTarget::command("listDatabases"),
            StoreError::network("socket closed"),
        )
        .times(2),
    );
    let admin = AdminOps::new(Arc::clone(&manager));

    admin.list_databases().await.unwrap();

    assert_eq!(server.command_count("listDatabases"), 3);
    let last = manager.recent_operations().pop().unwrap();
    assert_eq!(last.verb, "listDatabases");
    assert_eq!(last.attempts, 3);
}
