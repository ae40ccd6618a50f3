// ABOUTME: Principal reconciliation commands for docbridge-cli
// ABOUTME: Parses role@database grants and reports the reconciliation outcome
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use docbridge::errors::AppResult;
use docbridge::manager::ScopedConnection;
use docbridge::models::PrincipalRole;
use docbridge::principals::{PrincipalReconciler, PrincipalSpec};
use tracing::info;

/// `role@database` grants; a bare role applies to `default_database`
fn parse_roles(roles: &[String], default_database: &str) -> Vec<PrincipalRole> {
    roles
        .iter()
        .filter(|role| !role.trim().is_empty())
        .map(|role| match role.split_once('@') {
            Some((name, database)) => PrincipalRole::new(name.trim(), database.trim()),
            None => PrincipalRole::new(role.trim(), default_database),
        })
        .collect()
}

pub async fn reconcile(
    connection: &ScopedConnection,
    action: &str,
    username: String,
    password: Option<String>,
    roles: &[String],
    database: Option<String>,
) -> AppResult<()> {
    let reconciler = PrincipalReconciler::new(connection.manager());
    let grant_database = database
        .clone()
        .unwrap_or_else(|| connection.config().database().to_owned());

    let mut spec = PrincipalSpec::new(username).roles(parse_roles(roles, &grant_database));
    if let Some(password) = password {
        spec = spec.secret(password);
    }
    if let Some(database) = database {
        spec = spec.database(database);
    }

    let outcome = reconciler.reconcile_named(action, &spec).await?;
    info!(
        action = %outcome.action,
        principal = %outcome.principal,
        database = %outcome.database,
        "Principal reconciled"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn list(connection: &ScopedConnection, database: Option<&str>) -> AppResult<()> {
    let reconciler = PrincipalReconciler::new(connection.manager());
    for principal in reconciler.list_principals(database).await? {
        let roles: Vec<String> = principal
            .roles
            .iter()
            .map(|grant| format!("{}@{}", grant.role, grant.db))
            .collect();
        println!("{}@{} [{}]", principal.username, principal.database, roles.join(", "));
    }
    Ok(())
}
