// ABOUTME: Shared foundation crate for docbridge
// ABOUTME: Hosts the unified error taxonomy and the domain models used across the data layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

#![deny(unsafe_code)]

//! # docbridge-core
//!
//! Error types and plain data models shared by the `docbridge` crate.
//! Nothing in here talks to a database; the types only describe failures,
//! roles, principals and the operation history kept by a connection manager.

/// Unified error taxonomy (`AppError`, `StoreError`, `ReconciliationError`)
pub mod errors;

/// Domain models: roles, principals, operation history
pub mod models;

pub use errors::{
    AppError, AppResult, ReconciliationError, StoreError, StoreErrorKind, StoreResult,
};
