// ABOUTME: Database and collection listing commands for docbridge-cli
// ABOUTME: Prints one name per line
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use docbridge::admin::AdminOps;
use docbridge::errors::AppResult;
use docbridge::manager::ScopedConnection;

pub async fn databases(connection: &ScopedConnection) -> AppResult<()> {
    for name in AdminOps::new(connection.manager()).list_databases().await? {
        println!("{name}");
    }
    Ok(())
}

pub async fn collections(connection: &ScopedConnection, database: Option<&str>) -> AppResult<()> {
    for name in AdminOps::new(connection.manager())
        .list_collections(database)
        .await?
    {
        println!("{name}");
    }
    Ok(())
}
