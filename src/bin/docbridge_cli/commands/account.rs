// ABOUTME: Application account commands for docbridge-cli
// ABOUTME: Create, list, role changes, activation toggles, deletion and index setup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use clap::Subcommand;
use docbridge::accounts::{AccountStore, NewAccount};
use docbridge::errors::{AppError, AppResult};
use docbridge::executor::OperationExecutor;
use docbridge::manager::ScopedConnection;
use tracing::{info, warn};

#[derive(Subcommand)]
pub enum AccountCommand {
    /// Create an account
    Create {
        /// Unique username
        username: String,
        /// Contact email
        email: String,
        /// One of the fixed roles (viewer, admin, ...)
        role: String,
        /// Initial secret
        #[arg(long)]
        password: String,
    },
    /// List accounts sorted by username
    List {
        /// Only active accounts
        #[arg(long)]
        active_only: bool,
    },
    /// Change an account's role and permissions
    SetRole {
        /// Account to change
        username: String,
        /// New role
        role: String,
    },
    /// Re-enable an account
    Activate {
        /// Account to change
        username: String,
    },
    /// Disable an account
    Deactivate {
        /// Account to change
        username: String,
    },
    /// Permanently delete an account
    Delete {
        /// Account to delete
        username: String,
    },
    /// Delete every account
    Purge {
        /// Confirm the purge
        #[arg(long)]
        yes: bool,
    },
    /// Create the username, email and role indexes
    EnsureIndexes,
}

pub async fn run(connection: &ScopedConnection, command: AccountCommand) -> AppResult<()> {
    let store = AccountStore::new(OperationExecutor::new(connection.manager()));

    match command {
        AccountCommand::Create {
            username,
            email,
            role,
            password,
        } => {
            let account = store
                .create(NewAccount::new(username, email, role, password))
                .await?;
            println!(
                "Created {} ({}) id={}",
                account.username,
                account.role,
                account.id.as_deref().unwrap_or("-")
            );
        }
        AccountCommand::List { active_only } => {
            for account in store.list(None, active_only).await? {
                let status = if account.active { "active" } else { "inactive" };
                println!(
                    "{:<24} {:<32} {:<16} {}",
                    account.username, account.email, account.role, status
                );
            }
        }
        AccountCommand::SetRole { username, role } => {
            report(&username, store.update_role(&username, &role).await?);
        }
        AccountCommand::Activate { username } => {
            report(&username, store.activate(&username).await?);
        }
        AccountCommand::Deactivate { username } => {
            report(&username, store.deactivate(&username).await?);
        }
        AccountCommand::Delete { username } => {
            if !store.delete(&username).await? {
                return Err(AppError::not_found(format!("Account '{username}'")));
            }
            println!("Deleted {username}");
        }
        AccountCommand::Purge { yes } => {
            if !yes {
                return Err(AppError::invalid_input(
                    "Refusing to purge accounts without --yes",
                ));
            }
            let deleted = store.purge_all().await?;
            println!("Deleted {deleted} accounts");
        }
        AccountCommand::EnsureIndexes => {
            let names = store.ensure_indexes().await?;
            info!("Indexes on {}: {}", store.collection(), names.join(", "));
        }
    }
    Ok(())
}

fn report(username: &str, changed: bool) {
    if changed {
        println!("Updated {username}");
    } else {
        warn!("No changes made to {}", username);
    }
}
