// ABOUTME: Tests for the exponential backoff retry policy
// ABOUTME: Backoff growth, transient/fatal classification and exhaustion reporting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use docbridge::constants::env_config;
use docbridge::errors::{AppError, StoreError, StoreErrorKind};
use docbridge::retry::{is_transient, RetryError, RetryPolicy};
use serial_test::serial;

fn transient() -> AppError {
    AppError::store("find_one", StoreError::network("connection reset by peer"))
}

#[test]
fn test_backoff_doubles_and_caps() {
    let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(500));

    assert_eq!(policy.backoff(1), Duration::from_millis(100));
    assert_eq!(policy.backoff(2), Duration::from_millis(200));
    assert_eq!(policy.backoff(3), Duration::from_millis(400));
    assert_eq!(policy.backoff(4), Duration::from_millis(500));
    assert_eq!(policy.backoff(40), Duration::from_millis(500));
}

#[test]
fn test_policy_never_allows_zero_attempts() {
    let policy = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
    assert_eq!(policy.max_attempts, 1);
    assert_eq!(RetryPolicy::no_retry().max_attempts, 1);
}

#[test]
fn test_transient_classification() {
    assert!(is_transient(&transient()));
    assert!(is_transient(&AppError::Connection {
        target: "localhost:27017/d".to_owned(),
        source: StoreError::server_selection("no primary"),
    }));
    assert!(!is_transient(&AppError::store(
        "insert_one",
        StoreError::duplicate_key("E11000 duplicate key")
    )));
    assert!(!is_transient(&AppError::invalid_input("bad")));
    assert!(!is_transient(&AppError::RetriesExhausted {
        operation: "connect".to_owned(),
        attempts: 3,
        last: StoreError::network("down"),
    }));
}

#[tokio::test]
async fn test_succeeds_after_transient_failures() {
    common::init_test_logging();
    let calls = AtomicU32::new(0);
    let policy = common::fast_retry(3);

    let value = policy
        .run("find_one", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(transient())
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_fatal_failure_is_not_retried() {
    common::init_test_logging();
    let calls = AtomicU32::new(0);
    let policy = common::fast_retry(5);

    let result: Result<(), AppError> = policy
        .run("insert_one", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::invalid_input("Email cannot be empty")) }
        })
        .await;

    assert!(matches!(result, Err(AppError::InvalidInput(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exhaustion_reports_attempts_and_last_error() {
    common::init_test_logging();
    let calls = AtomicU32::new(0);
    let policy = common::fast_retry(4);

    let error = policy
        .run("ping", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(error.attempts(), Some(4));
    match error {
        AppError::RetriesExhausted {
            operation,
            attempts,
            last,
        } => {
            assert_eq!(operation, "ping");
            assert_eq!(attempts, 4);
            assert_eq!(last.kind, StoreErrorKind::Network);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generic_execute_with_custom_predicate() {
    common::init_test_logging();
    let policy = common::fast_retry(3);

    let result: Result<(), RetryError<String>> = policy
        .execute(
            "custom",
            |e: &String| e.starts_with("retry"),
            |attempt| async move {
                if attempt == 1 {
                    Err("retry me".to_owned())
                } else {
                    Err("give up".to_owned())
                }
            },
        )
        .await;

    match result {
        Err(RetryError::Fatal(message)) => assert_eq!(message, "give up"),
        other => panic!("expected a fatal error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_no_retry_policy_makes_single_attempt() {
    common::init_test_logging();
    let calls = AtomicU32::new(0);

    let error = RetryPolicy::no_retry()
        .run("connect", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(transient()) }
        })
        .await
        .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(error.attempts(), Some(1));
}

#[test]
#[serial]
fn test_retry_policy_from_env() {
    env::set_var(env_config::RETRY_MAX_ATTEMPTS, "5");
    env::set_var(env_config::RETRY_BASE_DELAY_MS, "20");
    let policy = RetryPolicy::from_env();
    env::remove_var(env_config::RETRY_MAX_ATTEMPTS);
    env::remove_var(env_config::RETRY_BASE_DELAY_MS);

    let policy = policy.unwrap();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.base_delay, Duration::from_millis(20));
    assert_eq!(policy.max_delay, Duration::from_millis(5_000));
}
