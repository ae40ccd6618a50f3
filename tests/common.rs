// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds in-memory deployments, connection managers, executors and account stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
#![allow(
    dead_code,
    clippy::wildcard_in_or_patterns,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `docbridge`
//!
//! Every test runs against a fresh [`MemoryServer`], so tests never share
//! state and can run in parallel.

use std::env;
use std::sync::{Arc, Once};
use std::time::Duration;

use docbridge::accounts::AccountStore;
use docbridge::config::ConnectionConfig;
use docbridge::executor::OperationExecutor;
use docbridge::manager::{ConnectionManager, Lifetime};
use docbridge::retry::RetryPolicy;
use docbridge::store::MemoryServer;

static INIT_LOGGER: Once = Once::new();

/// Database every test config points at
pub const TEST_DATABASE: &str = "docbridge_test";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Retry policy with millisecond delays so retry tests stay fast
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(
        max_attempts,
        Duration::from_millis(1),
        Duration::from_millis(5),
    )
    .with_jitter(false)
}

/// Unauthenticated config for the test database
pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::builder("localhost", 27017, TEST_DATABASE)
        .enable_auth(false)
        .build()
        .expect("valid test config")
}

/// Authenticated config for `username`/`password` against `admin`
pub fn auth_config(username: &str, password: &str) -> ConnectionConfig {
    ConnectionConfig::builder("localhost", 27017, TEST_DATABASE)
        .credentials(username, password)
        .auth_source("admin")
        .build()
        .expect("valid auth config")
}

/// Scoped manager over `server` with a fast retry policy
pub fn manager_for(server: &MemoryServer, config: ConnectionConfig) -> Arc<ConnectionManager> {
    Arc::new(
        ConnectionManager::new(config, Arc::new(server.connector()), Lifetime::Scoped)
            .with_retry_policy(fast_retry(3)),
    )
}

/// Fresh deployment plus a connected manager and executor
pub async fn setup() -> (MemoryServer, Arc<ConnectionManager>, OperationExecutor) {
    init_test_logging();
    let server = MemoryServer::new();
    let manager = manager_for(&server, test_config());
    manager.connect().await.expect("connect to memory server");
    let executor = OperationExecutor::new(Arc::clone(&manager));
    (server, manager, executor)
}

/// Account store with the cheapest bcrypt cost
pub async fn account_store() -> (MemoryServer, AccountStore) {
    let (server, _manager, executor) = setup().await;
    let store = AccountStore::new(executor).with_hash_cost(4);
    (server, store)
}
