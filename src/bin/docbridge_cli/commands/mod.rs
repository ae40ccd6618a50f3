// ABOUTME: Subcommand implementations for docbridge-cli
// ABOUTME: Groups administrative, principal, account and migration commands
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

pub mod account;
pub mod admin;
pub mod migrate;
pub mod principal;
