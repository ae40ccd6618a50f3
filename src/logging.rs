// ABOUTME: Structured logging setup built on tracing-subscriber
// ABOUTME: RUST_LOG style filtering with human-readable or JSON output
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

use crate::config::environment::env_string;
use crate::constants::env_config;
use crate::errors::{AppError, AppResult};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, one event per line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(AppError::config(format!("Unknown log format '{other}'"))),
        }
    }
}

impl LogFormat {
    /// Format from `DOCBRIDGE_LOG_FORMAT`, pretty when unset
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown format
    pub fn from_env() -> AppResult<Self> {
        env_string(env_config::LOG_FORMAT).map_or(Ok(Self::Pretty), |value| value.parse())
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `default_level`. A second call is a no-op.
///
/// # Errors
///
/// Returns a configuration error for an unknown log format or filter
pub fn init(default_level: &str) -> AppResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| AppError::config(format!("Invalid log filter '{default_level}': {e}")))?,
    };

    let installed = match LogFormat::from_env()? {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };
    if let Err(e) = installed {
        // Already installed by an earlier call or by a test harness
        tracing::debug!(error = %e, "Log subscriber already installed");
    }
    Ok(())
}
