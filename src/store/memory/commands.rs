// ABOUTME: Administrative command handling for the in-memory document store
// ABOUTME: Principal management, listing, drop and statistics commands with server-style replies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use mongodb::bson::{doc, Bson, Document};

use super::{ClientIdentity, ServerState, StoredPrincipal};
use crate::errors::{codes, StoreError, StoreResult};
use crate::models::PrincipalRole;

const USER_ADMIN_COMMANDS: [&str; 4] = ["usersInfo", "createUser", "updateUser", "dropUser"];

/// Dispatch `command` against `database`
pub(super) fn run(
    state: &mut ServerState,
    database: &str,
    command: &Document,
    identity: &ClientIdentity,
) -> StoreResult<Document> {
    let Some((name, argument)) = command.iter().next() else {
        return Err(StoreError::from_code(codes::BAD_VALUE, "empty command document"));
    };
    let name = name.as_str();
    if USER_ADMIN_COMMANDS.contains(&name)
        && state.restrict_user_admin
        && !identity.is_authenticated()
    {
        return Err(StoreError::unauthorized(format!(
            "not authorized on {database} to execute command {{ {name} }}"
        )));
    }
    match name {
        "ping" => Ok(ok_reply()),
        "hello" | "isMaster" => Ok(doc! { "isWritablePrimary": true, "ok": 1.0 }),
        "usersInfo" => users_info(state, database, argument),
        "createUser" => create_user(state, database, argument, command),
        "updateUser" => update_user(state, database, argument, command),
        "dropUser" => drop_user(state, database, argument),
        "listDatabases" => Ok(list_databases(state)),
        "listCollections" => Ok(list_collections(state, database)),
        "drop" => drop_collection(state, database, argument),
        "dropDatabase" => {
            state.databases.remove(database);
            Ok(doc! { "dropped": database, "ok": 1.0 })
        }
        "serverStatus" => Ok(doc! {
            "host": "memory",
            "version": "7.0.0-memory",
            "process": "docbridge-memory",
            "uptime": 0_i64,
            "connections": {
                "current": i64::from(state.live_clients),
                "totalCreated": i64::from(state.total_clients),
            },
            "ok": 1.0,
        }),
        "dbStats" => Ok(db_stats(state, database)),
        "collStats" => coll_stats(state, database, argument),
        other => Err(StoreError::from_code(
            codes::COMMAND_NOT_FOUND,
            format!("no such command: '{other}'"),
        )),
    }
}

fn ok_reply() -> Document {
    doc! { "ok": 1.0 }
}

fn name_argument<'a>(command: &str, argument: &'a Bson) -> StoreResult<&'a str> {
    argument.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
        StoreError::from_code(
            codes::BAD_VALUE,
            format!("{command} requires a non-empty string argument"),
        )
    })
}

fn parse_roles(database: &str, roles: &Bson) -> StoreResult<Vec<PrincipalRole>> {
    let Bson::Array(items) = roles else {
        return Err(StoreError::from_code(codes::BAD_VALUE, "roles must be an array"));
    };
    items
        .iter()
        .map(|item| match item {
            Bson::String(role) => Ok(PrincipalRole::new(role.clone(), database)),
            Bson::Document(grant) => {
                let role = grant.get_str("role").map_err(|_| {
                    StoreError::from_code(codes::BAD_VALUE, "role grant requires a 'role' field")
                })?;
                let db = grant.get_str("db").unwrap_or(database);
                Ok(PrincipalRole::new(role, db))
            }
            _ => Err(StoreError::from_code(
                codes::BAD_VALUE,
                "role grants must be strings or documents",
            )),
        })
        .collect()
}

fn user_document(database: &str, username: &str, principal: &StoredPrincipal) -> Document {
    let roles: Vec<Bson> = principal
        .roles
        .iter()
        .map(|grant| Bson::Document(doc! { "role": grant.role.clone(), "db": grant.db.clone() }))
        .collect();
    let mut document = doc! {
        "_id": format!("{database}.{username}"),
        "user": username,
        "db": database,
        "roles": roles,
        "mechanisms": ["SCRAM-SHA-256"],
    };
    if let Some(custom) = &principal.custom_data {
        document.insert("customData", custom.clone());
    }
    document
}

fn users_info(state: &ServerState, database: &str, argument: &Bson) -> StoreResult<Document> {
    let (db, user_filter): (String, Option<String>) = match argument {
        Bson::Document(spec) => (
            spec.get_str("db").unwrap_or(database).to_owned(),
            Some(spec.get_str("user").map_err(|_| {
                StoreError::from_code(codes::BAD_VALUE, "usersInfo document requires 'user'")
            })?.to_owned()),
        ),
        Bson::String(name) => (database.to_owned(), Some(name.clone())),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => (database.to_owned(), None),
        _ => {
            return Err(StoreError::from_code(
                codes::BAD_VALUE,
                "usersInfo expects a user document, a name, or 1",
            ))
        }
    };
    let users: Vec<Bson> = state
        .principals
        .iter()
        .filter(|((principal_db, name), _)| {
            principal_db == &db && user_filter.as_ref().map_or(true, |wanted| wanted == name)
        })
        .map(|((principal_db, name), principal)| {
            Bson::Document(user_document(principal_db, name, principal))
        })
        .collect();
    Ok(doc! { "users": users, "ok": 1.0 })
}

fn create_user(
    state: &mut ServerState,
    database: &str,
    argument: &Bson,
    command: &Document,
) -> StoreResult<Document> {
    let username = name_argument("createUser", argument)?;
    let key = (database.to_owned(), username.to_owned());
    if state.principals.contains_key(&key) {
        return Err(StoreError::from_code(
            codes::USER_ALREADY_EXISTS,
            format!("User \"{username}@{database}\" already exists"),
        ));
    }
    let password = command.get_str("pwd").map_err(|_| {
        StoreError::from_code(
            codes::BAD_VALUE,
            "Must provide a 'pwd' field for all user documents",
        )
    })?;
    let roles = command.get("roles").ok_or_else(|| {
        StoreError::from_code(codes::BAD_VALUE, "\"createUser\" command requires a \"roles\" array")
    })?;
    let principal = StoredPrincipal {
        password: password.to_owned(),
        roles: parse_roles(database, roles)?,
        custom_data: command.get_document("customData").ok().cloned(),
    };
    state.principals.insert(key, principal);
    Ok(ok_reply())
}

fn update_user(
    state: &mut ServerState,
    database: &str,
    argument: &Bson,
    command: &Document,
) -> StoreResult<Document> {
    let username = name_argument("updateUser", argument)?;
    let roles = command
        .get("roles")
        .map(|roles| parse_roles(database, roles))
        .transpose()?;
    let password = command.get_str("pwd").ok().map(str::to_owned);
    let custom_data = command.get_document("customData").ok().cloned();
    if roles.is_none() && password.is_none() && custom_data.is_none() {
        return Err(StoreError::from_code(
            codes::BAD_VALUE,
            "Must specify at least one field to update in updateUser",
        ));
    }
    let principal = state
        .principals
        .get_mut(&(database.to_owned(), username.to_owned()))
        .ok_or_else(|| {
            StoreError::from_code(
                codes::USER_NOT_FOUND,
                format!("User {username}@{database} not found"),
            )
        })?;
    if let Some(roles) = roles {
        principal.roles = roles;
    }
    if let Some(password) = password {
        principal.password = password;
    }
    if custom_data.is_some() {
        principal.custom_data = custom_data;
    }
    Ok(ok_reply())
}

fn drop_user(state: &mut ServerState, database: &str, argument: &Bson) -> StoreResult<Document> {
    let username = name_argument("dropUser", argument)?;
    state
        .principals
        .remove(&(database.to_owned(), username.to_owned()))
        .ok_or_else(|| {
            StoreError::from_code(
                codes::USER_NOT_FOUND,
                format!("User {username}@{database} not found"),
            )
        })?;
    Ok(ok_reply())
}

fn list_databases(state: &ServerState) -> Document {
    let mut names: Vec<String> = state
        .databases
        .iter()
        .filter(|(_, collections)| !collections.is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    if !state.principals.is_empty() && !names.iter().any(|name| name == "admin") {
        names.push("admin".to_owned());
        names.sort();
    }
    let databases: Vec<Bson> = names
        .into_iter()
        .map(|name| {
            let objects = state.databases.get(&name).map_or(0, |collections| {
                collections.values().map(|c| c.documents.len()).sum::<usize>()
            });
            Bson::Document(doc! {
                "name": name,
                "sizeOnDisk": objects as i64,
                "empty": objects == 0,
            })
        })
        .collect();
    doc! { "databases": databases, "totalSize": 0_i64, "ok": 1.0 }
}

fn list_collections(state: &ServerState, database: &str) -> Document {
    let batch: Vec<Bson> = state
        .databases
        .get(database)
        .map(|collections| {
            collections
                .keys()
                .map(|name| Bson::Document(doc! { "name": name.clone(), "type": "collection" }))
                .collect()
        })
        .unwrap_or_default();
    doc! {
        "cursor": {
            "id": 0_i64,
            "ns": format!("{database}.$cmd.listCollections"),
            "firstBatch": batch,
        },
        "ok": 1.0,
    }
}

fn drop_collection(state: &mut ServerState, database: &str, argument: &Bson) -> StoreResult<Document> {
    let collection = name_argument("drop", argument)?;
    let indexes = state
        .databases
        .get_mut(database)
        .and_then(|collections| collections.remove(collection))
        .map_or(0, |dropped| dropped.indexes.len() + 1);
    Ok(doc! {
        "ns": format!("{database}.{collection}"),
        "nIndexesWas": indexes as i32,
        "ok": 1.0,
    })
}

fn db_stats(state: &ServerState, database: &str) -> Document {
    let (collections, objects, indexes) = state.databases.get(database).map_or((0, 0, 0), |colls| {
        (
            colls.len(),
            colls.values().map(|c| c.documents.len()).sum::<usize>(),
            colls.values().map(|c| c.indexes.len() + 1).sum::<usize>(),
        )
    });
    doc! {
        "db": database,
        "collections": collections as i64,
        "objects": objects as i64,
        "indexes": indexes as i64,
        "ok": 1.0,
    }
}

fn coll_stats(state: &ServerState, database: &str, argument: &Bson) -> StoreResult<Document> {
    let collection = name_argument("collStats", argument)?;
    let found = state
        .databases
        .get(database)
        .and_then(|collections| collections.get(collection))
        .ok_or_else(|| {
            StoreError::from_code(
                codes::NAMESPACE_NOT_FOUND,
                format!("Collection [{database}.{collection}] not found."),
            )
        })?;
    Ok(doc! {
        "ns": format!("{database}.{collection}"),
        "count": found.documents.len() as i64,
        "nindexes": (found.indexes.len() + 1) as i64,
        "ok": 1.0,
    })
}
