// ABOUTME: Command-line front end for docbridge administration and migration
// ABOUTME: Connection checks, principal reconciliation, account management and PostgreSQL transfer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

//! # docbridge-cli
//!
//! Every command reads its connection parameters from the `DOCBRIDGE_MONGO_*`
//! (and for migration `DOCBRIDGE_PG_*`) environment variables.
//!
//! ```bash
//! docbridge-cli ping
//! docbridge-cli principal ensure-exists reporting --password s3cret --roles read@analytics
//! docbridge-cli account create alice alice@example.com viewer --password s3cret
//! docbridge-cli migrate --batch-size 500
//! docbridge-cli schema --output schema.json
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use docbridge::config::ConnectionConfig;
use docbridge::constants::migration::DEFAULT_BATCH_SIZE;
use docbridge::manager::{ConnectionRegistry, ScopedConnection};
use docbridge::retry::RetryPolicy;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "docbridge-cli",
    about = "docbridge administration tool",
    long_about = "Manage MongoDB principals and application accounts, and migrate PostgreSQL data into MongoDB"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the connection string built from the environment
    ConnectionString {
        /// Show the password instead of masking it
        #[arg(long)]
        show_secret: bool,
    },
    /// Connect and report the lifecycle state
    Ping,
    /// List databases
    Databases,
    /// List collections
    Collections {
        /// Database; the configured default when omitted
        #[arg(long)]
        database: Option<String>,
    },
    /// Reconcile a server-level principal
    Principal {
        /// create, update, ensure-exists or delete
        action: String,
        /// Principal name
        username: String,
        /// Principal secret (create and ensure-exists)
        #[arg(long)]
        password: Option<String>,
        /// Roles as `role` or `role@database`, comma separated
        #[arg(long, value_delimiter = ',')]
        roles: Vec<String>,
        /// Authentication database; the configured auth source when omitted
        #[arg(long)]
        database: Option<String>,
    },
    /// List server-level principals
    Principals {
        /// Authentication database; the configured auth source when omitted
        #[arg(long)]
        database: Option<String>,
    },
    /// Manage application accounts
    #[command(subcommand)]
    Account(commands::account::AccountCommand),
    /// Copy every PostgreSQL table into a collection of the same name
    Migrate {
        /// Rows per page
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
        /// Target database; the configured default when omitted
        #[arg(long)]
        target_database: Option<String>,
        /// Disable progress bars
        #[arg(long)]
        no_progress: bool,
    },
    /// Export the PostgreSQL schema as JSON
    Schema {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    docbridge::logging::init(log_level)?;

    let config = ConnectionConfig::from_env()?;

    match cli.command {
        Command::ConnectionString { show_secret } => {
            let uri = if show_secret {
                config.connection_string()
            } else {
                config.redacted_connection_string()
            };
            println!("{uri}");
        }
        Command::Ping => {
            let connection = connect(&config).await?;
            connection.get_client().await?;
            println!("{} {}", config.target(), connection.state());
        }
        Command::Databases => {
            let connection = connect(&config).await?;
            commands::admin::databases(&connection).await?;
        }
        Command::Collections { database } => {
            let connection = connect(&config).await?;
            commands::admin::collections(&connection, database.as_deref()).await?;
        }
        Command::Principal {
            action,
            username,
            password,
            roles,
            database,
        } => {
            let connection = connect(&config).await?;
            commands::principal::reconcile(
                &connection,
                &action,
                username,
                password,
                &roles,
                database,
            )
            .await?;
        }
        Command::Principals { database } => {
            let connection = connect(&config).await?;
            commands::principal::list(&connection, database.as_deref()).await?;
        }
        Command::Account(command) => {
            let connection = connect(&config).await?;
            commands::account::run(&connection, command).await?;
        }
        Command::Migrate {
            batch_size,
            target_database,
            no_progress,
        } => {
            let connection = connect(&config).await?;
            commands::migrate::transfer(&connection, batch_size, target_database, !no_progress)
                .await?;
        }
        Command::Schema { output } => {
            commands::migrate::schema(output.as_deref()).await?;
        }
    }

    Ok(())
}

async fn connect(config: &ConnectionConfig) -> Result<ScopedConnection> {
    info!("Connecting to {}", config.target());
    let registry = ConnectionRegistry::mongo().with_retry_policy(RetryPolicy::from_env()?);
    Ok(registry.scoped(config).await?)
}
