// ABOUTME: Domain model module root for docbridge-core
// ABOUTME: Re-exports role, principal and operation history types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

/// Operation history ring buffer
pub mod history;
/// Server-level authentication principals and reconciliation actions
pub mod principal;
/// Application roles and their permission sets
pub mod role;

pub use history::{OperationHistory, OperationRecord, OperationStatus, DEFAULT_HISTORY_CAPACITY};
pub use principal::{Principal, PrincipalRole, ReconcileAction, ReconcileOutcome};
pub use role::Role;
