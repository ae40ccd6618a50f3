// ABOUTME: Tests for log output format selection and subscriber installation
// ABOUTME: Format parsing, environment lookup and repeated initialisation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::env;

use docbridge::errors::AppError;
use docbridge::logging::{self, LogFormat};
use serial_test::serial;

#[test]
fn test_log_format_parsing() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    assert!(matches!("xml".parse::<LogFormat>(), Err(AppError::Config(_))));
}

#[test]
#[serial]
fn test_log_format_from_env() {
    env::remove_var("DOCBRIDGE_LOG_FORMAT");
    assert_eq!(LogFormat::from_env().unwrap(), LogFormat::Pretty);

    env::set_var("DOCBRIDGE_LOG_FORMAT", "json");
    assert_eq!(LogFormat::from_env().unwrap(), LogFormat::Json);

    env::set_var("DOCBRIDGE_LOG_FORMAT", "syslog");
    assert!(LogFormat::from_env().is_err());

    env::remove_var("DOCBRIDGE_LOG_FORMAT");
}

#[test]
#[serial]
fn test_init_twice_is_harmless() {
    env::remove_var("DOCBRIDGE_LOG_FORMAT");
    logging::init("warn").unwrap();
    logging::init("debug").unwrap();
}
