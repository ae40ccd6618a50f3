// ABOUTME: Typed readers for environment-based configuration
// ABOUTME: Unset or blank variables fall back to defaults; malformed ones are configuration errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::env;
use std::fmt::Display;
use std::str::FromStr;

use crate::errors::{AppError, AppResult};

/// Value of `key` with surrounding whitespace removed, or `None` when unset or blank
#[must_use]
pub fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Parse `key` into `T`, returning `default` when unset
///
/// # Errors
///
/// Returns a configuration error when the variable is set but does not parse
pub fn env_or<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    env_string(key).map_or(Ok(default), |raw| {
        raw.parse::<T>()
            .map_err(|e| AppError::config(format!("Invalid value for {key} ('{raw}'): {e}")))
    })
}

/// Read a boolean flag, accepting `true/false`, `1/0`, `yes/no` and `on/off`
///
/// # Errors
///
/// Returns a configuration error for any other spelling
pub fn env_bool(key: &str, default: bool) -> AppResult<bool> {
    let Some(raw) = env_string(key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!(
            "Invalid boolean for {key}: '{raw}'"
        ))),
    }
}
