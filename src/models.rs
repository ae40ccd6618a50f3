// ABOUTME: Domain model re-exports for the docbridge crate
// ABOUTME: Canonical definitions live in docbridge-core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

// Re-export DTOs from docbridge-core (canonical definitions)
pub use docbridge_core::models::{
    OperationHistory, OperationRecord, OperationStatus, Principal, PrincipalRole,
    ReconcileAction, ReconcileOutcome, Role, DEFAULT_HISTORY_CAPACITY,
};
