// ABOUTME: Main library entry point for docbridge
// ABOUTME: Resilient MongoDB access layer with account reconciliation and PostgreSQL migration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

// Crate-level attributes:
// - recursion_limit: Increased from default 128 to 256 for nested `doc!` invocations
//   and async-stream expansion
// - deny(unsafe_code): Zero-tolerance unsafe policy
#![recursion_limit = "256"]
#![deny(unsafe_code)]

//! # docbridge
//!
//! An administrative and data-access layer that sits in front of a MongoDB
//! deployment.
//!
//! ## Features
//!
//! - **Resilient connections**: exponential-backoff retry, liveness checks and
//!   transparent reconnection, with an explicit degraded state when
//!   authenticated connections are rejected
//! - **Operation executor**: a closed set of data verbs, automatic timestamps,
//!   `$set` normalisation and uniform error translation
//! - **Account management**: bcrypt-hashed application accounts with a fixed
//!   role → permission table
//! - **Principal reconciliation**: idempotent `ensure_exists` plus strict
//!   create/update/delete for server-level users
//! - **Migration**: paged PostgreSQL → MongoDB transfer and schema export
//!
//! ## Architecture
//!
//! - **Config**: immutable connection parameters, environment loading
//! - **Store**: client boundary traits with `MongoDB` and in-memory backends
//! - **Manager**: connection lifecycle, sessions and transactions
//! - **Executor**: retried data verbs on top of the manager
//! - **Accounts / Principals / Migration / Admin**: domain services
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use docbridge::config::ConnectionConfig;
//! use docbridge::errors::AppResult;
//! use docbridge::manager::ConnectionRegistry;
//!
//! #[tokio::main]
//! async fn main() -> AppResult<()> {
//!     let config = ConnectionConfig::from_env()?;
//!     let registry = ConnectionRegistry::mongo();
//!     let manager = registry.shared(&config).await?;
//!
//!     println!("Connected: {:?}", manager.state());
//!     Ok(())
//! }
//! ```

/// Application account store (bcrypt-hashed users with fixed roles)
pub mod accounts;

/// Thin administrative command wrappers
pub mod admin;

/// Connection and relational source configuration
pub mod config;

/// Default values and environment variable names
pub mod constants;

/// Unified error handling re-exported from docbridge-core
pub mod errors;

/// Retry-aware execution of data verbs
pub mod executor;

/// Structured logging setup
pub mod logging;

/// Connection lifecycle, registry and scoped sessions
pub mod manager;

/// Relational → document migration pipeline
pub mod migration;

/// Domain models re-exported from docbridge-core
pub mod models;

/// Closed set of data verbs and their outcomes
pub mod operations;

/// Server-level principal reconciliation
pub mod principals;

/// Exponential backoff retry policy
pub mod retry;

/// Document-store client boundary and its backends
pub mod store;
