// ABOUTME: Application account records and their document representation
// ABOUTME: Validation of new accounts and partial updates against the fixed role table
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::fmt;

use chrono::{DateTime, Utc};
use mongodb::bson::{self, doc, Bson, Document};

use crate::constants::fields;
use crate::errors::{AppError, AppResult};
use crate::models::Role;

/// Stored field names
pub mod field {
    /// Unique login name
    pub const USERNAME: &str = "username";
    /// Contact address
    pub const EMAIL: &str = "email";
    /// Role name
    pub const ROLE: &str = "role";
    /// bcrypt hash of the secret
    pub const HASHED_PASSWORD: &str = "hashed_password";
    /// Active flag
    pub const ACTIVE: &str = "active";
    /// Free-form metadata
    pub const METADATA: &str = "metadata";
    /// Granted permissions
    pub const PERMISSIONS: &str = "permissions";
}

/// Application-level account as stored
#[derive(Clone, PartialEq)]
pub struct Account {
    /// Store-assigned id (hex `ObjectId`)
    pub id: Option<String>,
    /// Unique login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Role from the fixed table
    pub role: Role,
    /// bcrypt hash of the secret
    pub hashed_password: String,
    /// Inactive accounts never authenticate
    pub active: bool,
    /// Free-form metadata
    pub metadata: Document,
    /// Granted permissions; derived from the role unless overridden
    pub permissions: Vec<String>,
    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Last update timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("hashed_password", &"[REDACTED]")
            .field("active", &self.active)
            .field("metadata", &self.metadata)
            .field("permissions", &self.permissions)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

impl Account {
    /// Document written on insert; the id and timestamps are assigned by the
    /// store
    #[must_use]
    pub fn to_document(&self) -> Document {
        doc! {
            "username": self.username.clone(),
            "email": self.email.clone(),
            "role": self.role.as_str(),
            "hashed_password": self.hashed_password.clone(),
            "active": self.active,
            "metadata": self.metadata.clone(),
            "permissions": self.permissions.clone(),
        }
    }

    /// Decode a stored document
    ///
    /// # Errors
    ///
    /// [`AppError::Serialization`] when a required field is missing or the
    /// stored role is not in the role table
    pub fn from_document(document: &Document) -> AppResult<Self> {
        let required = |name: &str| {
            document.get_str(name).map(str::to_owned).map_err(|e| {
                AppError::serialization(format!("account document field '{name}': {e}"))
            })
        };
        let role_name = required(field::ROLE)?;
        let role: Role = role_name.parse().map_err(|_| {
            AppError::serialization(format!("account document has unknown role '{role_name}'"))
        })?;
        let permissions = document.get_array(field::PERMISSIONS).map_or_else(
            |_| role.permission_list(),
            |items| {
                items
                    .iter()
                    .filter_map(Bson::as_str)
                    .map(str::to_owned)
                    .collect()
            },
        );

        Ok(Self {
            id: document.get(fields::ID).map(id_to_string),
            username: required(field::USERNAME)?,
            email: required(field::EMAIL)?,
            role,
            hashed_password: required(field::HASHED_PASSWORD)?,
            active: document.get_bool(field::ACTIVE).unwrap_or(true),
            metadata: document
                .get_document(field::METADATA)
                .cloned()
                .unwrap_or_default(),
            permissions,
            created_at: timestamp(document, fields::CREATED_AT),
            updated_at: timestamp(document, fields::UPDATED_AT),
        })
    }
}

/// Hex string for an `ObjectId`, plain text for any other id
#[must_use]
pub fn id_to_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn timestamp(document: &Document, name: &str) -> Option<DateTime<Utc>> {
    document
        .get_datetime(name)
        .ok()
        .and_then(|at: &bson::DateTime| DateTime::from_timestamp_millis(at.timestamp_millis()))
}

/// Account to be created
#[derive(Clone, PartialEq)]
pub struct NewAccount {
    /// Unique login name
    pub username: String,
    /// Contact address
    pub email: String,
    /// Role name, validated against the role table
    pub role: String,
    /// Plain secret; hashed before storage
    pub secret: String,
    /// Initial active flag
    pub active: bool,
    /// Free-form metadata
    pub metadata: Document,
    /// Explicit permissions instead of the role's
    pub permissions: Option<Vec<String>>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("secret", &"[REDACTED]")
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl NewAccount {
    /// Active account with empty metadata and role-derived permissions
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            role: role.into(),
            secret: secret.into(),
            active: true,
            metadata: Document::new(),
            permissions: None,
        }
    }

    /// Attach metadata
    #[must_use]
    pub fn metadata(mut self, metadata: Document) -> Self {
        self.metadata = metadata;
        self
    }

    /// Create the account inactive
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Override the role's permissions
    #[must_use]
    pub fn permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Check names and resolve the role
    ///
    /// # Errors
    ///
    /// [`AppError::InvalidInput`] for an empty username or email, or an
    /// unknown role
    pub fn validate(&self) -> AppResult<Role> {
        if self.username.trim().is_empty() {
            return Err(AppError::invalid_input("Username cannot be empty"));
        }
        if self.email.trim().is_empty() {
            return Err(AppError::invalid_input("Email cannot be empty"));
        }
        if self.secret.is_empty() {
            return Err(AppError::invalid_input("Secret cannot be empty"));
        }
        self.role.parse()
    }
}

/// Partial account update; unset fields are left unchanged
#[derive(Clone, Default, PartialEq)]
pub struct AccountUpdate {
    /// Usernames are immutable; setting this is rejected
    pub username: Option<String>,
    /// New contact address
    pub email: Option<String>,
    /// New role; permissions follow unless overridden
    pub role: Option<String>,
    /// New plain secret; re-hashed
    pub secret: Option<String>,
    /// New active flag
    pub active: Option<bool>,
    /// Replacement metadata
    pub metadata: Option<Document>,
    /// Explicit permissions
    pub permissions: Option<Vec<String>>,
}

impl fmt::Debug for AccountUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountUpdate")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("active", &self.active)
            .field("metadata", &self.metadata)
            .field("permissions", &self.permissions)
            .finish()
    }
}

impl AccountUpdate {
    /// Empty update
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Change the email
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Change the role
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Change the secret
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Change the active flag
    #[must_use]
    pub const fn active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }

    /// Replace the metadata
    #[must_use]
    pub fn metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Override permissions
    #[must_use]
    pub fn permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    /// Whether nothing would change
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.role.is_none()
            && self.secret.is_none()
            && self.active.is_none()
            && self.metadata.is_none()
            && self.permissions.is_none()
    }
}
