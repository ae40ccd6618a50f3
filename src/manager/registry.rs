// ABOUTME: Registry handing out shared or scoped connection managers
// ABOUTME: One lazily initialised shared manager per registry; scoped managers close on drop
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::{ConnectionManager, Lifetime};
use crate::config::ConnectionConfig;
use crate::errors::AppResult;
use crate::retry::RetryPolicy;
use crate::store::{Connector, MongoConnector};

/// Hands out connection managers
///
/// The shared manager is created and connected by the first caller of
/// [`shared`](Self::shared); later callers receive the same instance. A failed
/// initialisation leaves the registry empty so the next caller tries again.
pub struct ConnectionRegistry {
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    shared: OnceCell<Arc<ConnectionManager>>,
}

impl ConnectionRegistry {
    /// Registry building clients with `connector`
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            shared: OnceCell::new(),
        }
    }

    /// Registry backed by the official driver
    #[must_use]
    pub fn mongo() -> Self {
        Self::new(Arc::new(MongoConnector))
    }

    /// Retry policy given to every manager created from now on
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build(&self, config: &ConnectionConfig, lifetime: Lifetime) -> ConnectionManager {
        ConnectionManager::new(config.clone(), Arc::clone(&self.connector), lifetime)
            .with_retry_policy(self.retry.clone())
    }

    /// The process-wide manager, connecting it on first use
    ///
    /// Only the first successful call's configuration is used; a differing
    /// configuration passed later is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns the connection failure of the initialising call
    pub async fn shared(&self, config: &ConnectionConfig) -> AppResult<Arc<ConnectionManager>> {
        let manager = self
            .shared
            .get_or_try_init(|| async {
                let manager = Arc::new(self.build(config, Lifetime::Shared));
                manager.connect().await?;
                debug!(target = %config.target(), "Initialised shared connection manager");
                Ok::<_, crate::errors::AppError>(manager)
            })
            .await?;
        if manager.config() != config {
            warn!(
                requested = %config.target(),
                active = %manager.config().target(),
                "Shared connection manager already initialised with a different configuration"
            );
        }
        Ok(Arc::clone(manager))
    }

    /// The shared manager, if one has been initialised
    #[must_use]
    pub fn shared_if_initialized(&self) -> Option<Arc<ConnectionManager>> {
        self.shared.get().cloned()
    }

    /// A fresh manager owned by the caller and closed when dropped
    ///
    /// # Errors
    ///
    /// Returns the connection failure
    pub async fn scoped(&self, config: &ConnectionConfig) -> AppResult<ScopedConnection> {
        let manager = Arc::new(self.build(config, Lifetime::Scoped));
        manager.connect().await?;
        Ok(ScopedConnection { manager })
    }

    /// Acquire a manager of the requested lifetime
    ///
    /// # Errors
    ///
    /// Returns the connection failure
    pub async fn acquire(
        &self,
        config: &ConnectionConfig,
        lifetime: Lifetime,
    ) -> AppResult<ConnectionLease> {
        Ok(match lifetime {
            Lifetime::Shared => ConnectionLease::Shared(self.shared(config).await?),
            Lifetime::Scoped => ConnectionLease::Scoped(self.scoped(config).await?),
        })
    }
}

/// Manager closed as soon as this guard is dropped
#[derive(Debug)]
pub struct ScopedConnection {
    manager: Arc<ConnectionManager>,
}

impl ScopedConnection {
    /// Shareable handle to the manager; it stays usable only until the guard
    /// is dropped
    #[must_use]
    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }
}

impl Deref for ScopedConnection {
    type Target = ConnectionManager;

    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.manager.close();
    }
}

/// Manager acquired through [`ConnectionRegistry::acquire`]
#[derive(Debug)]
pub enum ConnectionLease {
    /// The registry's shared manager
    Shared(Arc<ConnectionManager>),
    /// A manager closed when the lease is dropped
    Scoped(ScopedConnection),
}

impl ConnectionLease {
    /// Shareable handle to the underlying manager
    #[must_use]
    pub fn manager(&self) -> Arc<ConnectionManager> {
        match self {
            Self::Shared(manager) => Arc::clone(manager),
            Self::Scoped(scoped) => scoped.manager(),
        }
    }
}

impl Deref for ConnectionLease {
    type Target = ConnectionManager;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Shared(manager) => manager,
            Self::Scoped(scoped) => scoped,
        }
    }
}
