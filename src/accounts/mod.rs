// ABOUTME: Application account store backed by a document collection
// ABOUTME: bcrypt-hashed secrets, fixed role table, uniqueness enforced by count check and unique index
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! # Account store
//!
//! Application accounts live in one collection (`users` by default). They are
//! unrelated to the server-level principals handled by
//! [`crate::principals`].
//!
//! Secrets are hashed with bcrypt on a blocking thread before they reach the
//! store. [`AccountStore::authenticate`] never fails: every problem, store
//! failures included, reads as "not authenticated".

mod account;

pub use account::{field, id_to_string, Account, AccountUpdate, NewAccount};

use mongodb::bson::{doc, Document};
use tokio::task::spawn_blocking;
use tracing::{error, info, warn};

use crate::constants::accounts::COLLECTION;
use crate::errors::{AppError, AppResult, StoreErrorKind};
use crate::executor::{CollectionRef, OperationExecutor};
use crate::models::Role;
use crate::operations::FindOptions;
use crate::store::IndexSpec;

/// CRUD over application accounts
#[derive(Debug, Clone)]
pub struct AccountStore {
    executor: OperationExecutor,
    collection: CollectionRef,
    hash_cost: u32,
}

impl AccountStore {
    /// Store over the default `users` collection
    #[must_use]
    pub fn new(executor: OperationExecutor) -> Self {
        Self {
            executor,
            collection: CollectionRef::new(COLLECTION),
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Use another collection
    #[must_use]
    pub fn with_collection(mut self, collection: CollectionRef) -> Self {
        self.collection = collection;
        self
    }

    /// bcrypt work factor for new hashes
    #[must_use]
    pub const fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    /// Collection holding the accounts
    #[must_use]
    pub const fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    async fn hash_secret(&self, secret: &str) -> AppResult<String> {
        let secret = secret.to_owned();
        let cost = self.hash_cost;
        spawn_blocking(move || bcrypt::hash(secret, cost))
            .await
            .map_err(|e| AppError::internal(format!("bcrypt task failed: {e}")))?
            .map_err(|e| AppError::internal(format!("bcrypt error: {e}")))
    }

    async fn verify_secret(secret: &str, hash: &str) -> bool {
        let secret = secret.to_owned();
        let hash = hash.to_owned();
        spawn_blocking(move || bcrypt::verify(&secret, &hash).unwrap_or(false))
            .await
            .unwrap_or(false)
    }

    /// Create an account
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidInput`] for an empty name or email or an unknown role
    /// - [`AppError::AlreadyExists`] when the username is taken
    pub async fn create(&self, account: NewAccount) -> AppResult<Account> {
        let role = account.validate()?;
        if self.exists(&account.username).await? {
            return Err(AppError::already_exists(format!(
                "Account '{}'",
                account.username
            )));
        }

        let hashed_password = self.hash_secret(&account.secret).await?;
        let mut created = Account {
            id: None,
            username: account.username,
            email: account.email,
            role,
            hashed_password,
            active: account.active,
            metadata: account.metadata,
            permissions: account
                .permissions
                .unwrap_or_else(|| role.permission_list()),
            created_at: None,
            updated_at: None,
        };

        match self
            .executor
            .insert_one(self.collection.clone(), created.to_document())
            .await
        {
            Ok(id) => {
                created.id = Some(id_to_string(&id));
                info!(username = %created.username, role = %role, "Created account");
                Ok(created)
            }
            // The unique index catches a concurrent create that passed the count check
            Err(e) if is_duplicate_key(&e) => Err(AppError::already_exists(format!(
                "Account '{}'",
                created.username
            ))),
            Err(e) => Err(e),
        }
    }

    /// Account by username
    ///
    /// # Errors
    ///
    /// Store failures, or an undecodable stored document
    pub async fn get(&self, username: &str) -> AppResult<Option<Account>> {
        self.executor
            .find_one(self.collection.clone(), doc! { "username": username }, None)
            .await?
            .as_ref()
            .map(Account::from_document)
            .transpose()
    }

    /// Account by store-assigned id
    ///
    /// # Errors
    ///
    /// Store failures, or an undecodable stored document
    pub async fn get_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        self.executor
            .find_by_id(self.collection.clone(), id)
            .await?
            .as_ref()
            .map(Account::from_document)
            .transpose()
    }

    /// Whether the username is taken
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn exists(&self, username: &str) -> AppResult<bool> {
        self.executor
            .exists(self.collection.clone(), doc! { "username": username })
            .await
    }

    /// Whether `secret` matches an active account
    ///
    /// Unknown and inactive accounts, mismatched secrets and store failures
    /// all return `false`.
    pub async fn authenticate(&self, username: &str, secret: &str) -> bool {
        match self.get(username).await {
            Ok(Some(account)) if account.active => {
                Self::verify_secret(secret, &account.hashed_password).await
            }
            Ok(Some(_)) => {
                info!(username = %username, "Authentication refused for inactive account");
                false
            }
            Ok(None) => false,
            Err(e) => {
                error!(username = %username, error = %e, "Authentication lookup failed");
                false
            }
        }
    }

    /// Apply a partial update; returns whether a document changed
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidInput`] for a username change, an empty update, an
    /// empty email or an unknown role; otherwise store failures
    pub async fn update(&self, username: &str, update: AccountUpdate) -> AppResult<bool> {
        if update.username.is_some() {
            return Err(AppError::invalid_input("Username cannot be changed"));
        }
        if update.is_empty() {
            return Err(AppError::invalid_input("Account update has no fields"));
        }

        let mut set = Document::new();
        if let Some(email) = update.email {
            if email.trim().is_empty() {
                return Err(AppError::invalid_input("Email cannot be empty"));
            }
            set.insert(field::EMAIL, email);
        }
        if let Some(role) = update.role {
            let role: Role = role.parse()?;
            set.insert(field::ROLE, role.as_str());
            set.insert(field::PERMISSIONS, role.permission_list());
        }
        if let Some(permissions) = update.permissions {
            set.insert(field::PERMISSIONS, permissions);
        }
        if let Some(secret) = update.secret {
            set.insert(field::HASHED_PASSWORD, self.hash_secret(&secret).await?);
        }
        if let Some(active) = update.active {
            set.insert(field::ACTIVE, active);
        }
        if let Some(metadata) = update.metadata {
            set.insert(field::METADATA, metadata);
        }

        self.apply_set(username, set).await
    }

    /// Change the role and its permissions in one write
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidInput`] for an unknown role; otherwise store failures
    pub async fn update_role(&self, username: &str, role: &str) -> AppResult<bool> {
        let role: Role = role.parse()?;
        self.apply_set(
            username,
            doc! { "role": role.as_str(), "permissions": role.permission_list() },
        )
        .await
    }

    /// Re-enable an account
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn activate(&self, username: &str) -> AppResult<bool> {
        self.apply_set(username, doc! { "active": true }).await
    }

    /// Disable an account; it can no longer authenticate
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn deactivate(&self, username: &str) -> AppResult<bool> {
        self.apply_set(username, doc! { "active": false }).await
    }

    async fn apply_set(&self, username: &str, set: Document) -> AppResult<bool> {
        let summary = self
            .executor
            .update_one(
                self.collection.clone(),
                doc! { "username": username },
                doc! { "$set": set },
                false,
            )
            .await?;
        let changed = summary.modified > 0;
        if changed {
            info!(username = %username, "Updated account");
        } else {
            warn!(username = %username, "No changes made to account");
        }
        Ok(changed)
    }

    /// Accounts matching `filter`, optionally restricted to active ones
    ///
    /// # Errors
    ///
    /// Store failures, or an undecodable stored document
    pub async fn list(&self, filter: Option<Document>, active_only: bool) -> AppResult<Vec<Account>> {
        let mut filter = filter.unwrap_or_default();
        if active_only {
            filter.insert(field::ACTIVE, true);
        }
        let options = FindOptions {
            sort: Some(doc! { "username": 1 }),
            ..FindOptions::default()
        };
        self.executor
            .find_many(self.collection.clone(), filter, options)
            .await?
            .iter()
            .map(Account::from_document)
            .collect()
    }

    /// Permanently delete an account; returns whether one was deleted
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn delete(&self, username: &str) -> AppResult<bool> {
        let deleted = self
            .executor
            .delete_one(self.collection.clone(), doc! { "username": username })
            .await?;
        if deleted > 0 {
            info!(username = %username, "Deleted account");
        } else {
            warn!(username = %username, "Account not found for deletion");
        }
        Ok(deleted > 0)
    }

    /// Delete every account and return how many were removed
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn purge_all(&self) -> AppResult<u64> {
        let deleted = self
            .executor
            .delete_many(self.collection.clone(), Document::new())
            .await?;
        if deleted > 0 {
            info!(deleted, "Purged all accounts");
        } else {
            warn!("No accounts found to purge");
        }
        Ok(deleted)
    }

    /// Unique index on username, plain indexes on email and role
    ///
    /// # Errors
    ///
    /// Store failures
    pub async fn ensure_indexes(&self) -> AppResult<Vec<String>> {
        let indexes = [
            IndexSpec::new(doc! { "username": 1 }).unique(),
            IndexSpec::new(doc! { "email": 1 }),
            IndexSpec::new(doc! { "role": 1 }),
        ];
        let mut names = Vec::with_capacity(indexes.len());
        for index in indexes {
            names.push(
                self.executor
                    .create_index(self.collection.clone(), index)
                    .await?,
            );
        }
        info!(collection = %self.collection, indexes = ?names, "Account indexes ensured");
        Ok(names)
    }
}

fn is_duplicate_key(error: &AppError) -> bool {
    error
        .store_error()
        .is_some_and(|e| e.kind == StoreErrorKind::DuplicateKey)
}
