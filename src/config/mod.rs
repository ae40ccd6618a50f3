// ABOUTME: Configuration module root for docbridge
// ABOUTME: Exposes the document-store and relational source configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

/// Document-store connection parameters, URI assembly and client settings
pub mod connection;
/// Typed environment variable readers
pub mod environment;
/// Relational source parameters for the migration pipeline
pub mod relational;

pub use connection::{
    Acknowledgment, CertPolicy, ClientSettings, ConnectionConfig, ConnectionConfigBuilder,
    ReadPreference, TlsSettings, WriteConcernSetting,
};
pub use relational::RelationalConfig;
