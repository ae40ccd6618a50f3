// ABOUTME: Exponential backoff retry policy with transient/fatal failure classification
// ABOUTME: Wraps connection establishment, handle refresh and every data operation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! Retry policy
//!
//! [`RetryPolicy::execute`] is the generic form: the caller supplies a
//! classification predicate and gets back a [`RetryError`] that tells a fatal
//! failure apart from an exhausted one. [`RetryPolicy::run`] specialises it
//! for [`AppError`], retrying client failures whose kind is transient.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::environment::env_or;
use crate::constants::{env_config, retry as defaults};
use crate::errors::{AppError, AppResult};

/// Outcome of a failed retried call
#[derive(Debug)]
pub enum RetryError<E> {
    /// Non-retryable failure, surfaced on the attempt that produced it
    Fatal(E),
    /// Retryable failures persisted for every allowed attempt
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Last failure observed
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying failure
    pub fn into_inner(self) -> E {
        match self {
            Self::Fatal(e) | Self::Exhausted { last: e, .. } => e,
        }
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Scale each delay by a random factor in `[0.5, 1.0]`
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::DEFAULT_BASE_DELAY_MS),
            max_delay: Duration::from_millis(defaults::DEFAULT_MAX_DELAY_MS),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit bounds and jitter enabled
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            jitter: true,
        }
    }

    /// Single attempt, never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Toggle jitter
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Load from `DOCBRIDGE_RETRY_*` environment variables
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a variable is malformed
    pub fn from_env() -> AppResult<Self> {
        Ok(Self::new(
            env_or(env_config::RETRY_MAX_ATTEMPTS, defaults::DEFAULT_MAX_ATTEMPTS)?,
            Duration::from_millis(env_or(
                env_config::RETRY_BASE_DELAY_MS,
                defaults::DEFAULT_BASE_DELAY_MS,
            )?),
            Duration::from_millis(env_or(
                env_config::RETRY_MAX_DELAY_MS,
                defaults::DEFAULT_MAX_DELAY_MS,
            )?),
        ))
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at `max_delay`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if self.jitter {
            let scale = rand::thread_rng().gen_range(defaults::JITTER_MIN..=1.0);
            delay.mul_f64(scale)
        } else {
            delay
        }
    }

    /// Run `attempt` until it succeeds, fails fatally, or attempts run out
    ///
    /// `attempt` receives the 1-based attempt number. `is_retryable` decides
    /// whether a failure is transient.
    ///
    /// # Errors
    ///
    /// [`RetryError::Fatal`] for a non-retryable failure,
    /// [`RetryError::Exhausted`] when every attempt failed transiently
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        operation: &str,
        is_retryable: C,
        mut attempt: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: std::fmt::Display,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut current = 1;
        loop {
            match attempt(current).await {
                Ok(value) => return Ok(value),
                Err(e) if !is_retryable(&e) => return Err(RetryError::Fatal(e)),
                Err(e) if current >= max_attempts => {
                    error!(
                        operation = %operation,
                        attempts = current,
                        error = %e,
                        "Retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: current,
                        last: e,
                    });
                }
                Err(e) => {
                    let delay = self.delay_for(current);
                    warn!(
                        operation = %operation,
                        attempt = current,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    current += 1;
                }
            }
        }
    }

    /// [`execute`](Self::execute) specialised for [`AppError`]
    ///
    /// Client failures of a transient kind are retried. Exhaustion becomes
    /// [`AppError::RetriesExhausted`] carrying the attempt count.
    ///
    /// # Errors
    ///
    /// The first fatal error, or `RetriesExhausted`
    pub async fn run<T, F, Fut>(&self, operation: &str, attempt: F) -> AppResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        self.execute(operation, is_transient, attempt)
            .await
            .map_err(|e| match e {
                RetryError::Fatal(e) => e,
                RetryError::Exhausted { attempts, last } => exhausted(operation, attempts, last),
            })
    }
}

/// Whether an [`AppError`] is worth another attempt
///
/// Only direct client failures qualify. An error that already reports
/// exhaustion is never retried again by an outer policy.
#[must_use]
pub fn is_transient(error: &AppError) -> bool {
    match error {
        AppError::Store { source, .. } | AppError::Connection { source, .. } => {
            source.is_retryable()
        }
        _ => false,
    }
}

fn exhausted(operation: &str, attempts: u32, last: AppError) -> AppError {
    match last {
        AppError::Store { source, .. } | AppError::Connection { source, .. } => {
            AppError::RetriesExhausted {
                operation: operation.to_owned(),
                attempts,
                last: source,
            }
        }
        other => other,
    }
}
