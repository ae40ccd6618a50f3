// ABOUTME: Error type re-exports for the docbridge crate
// ABOUTME: Canonical definitions live in docbridge-core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

// Re-export error types from docbridge-core (canonical definitions)
pub use docbridge_core::errors::{
    codes, AppError, AppResult, ReconciliationError, StoreError, StoreErrorKind, StoreResult,
};
