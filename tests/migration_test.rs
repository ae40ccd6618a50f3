// ABOUTME: Integration tests for the relational to document migration pipeline
// ABOUTME: Paged transfers, value conversion, failure propagation and schema export
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{TimeZone, Utc};
use common::TEST_DATABASE;
use docbridge::errors::{AppError, StoreError};
use docbridge::migration::{
    export_schema, row_to_document, MemorySource, MemoryTable, MigrationPipeline, Row, SqlValue,
};
use docbridge::operations::OperationKind;
use docbridge::store::{Fault, FaultTarget};
use mongodb::bson::Bson;
use rust_decimal::Decimal;

fn meter_row(id: i64, reading: Decimal) -> Row {
    Row::new()
        .with("id", id)
        .with("site", format!("site-{id}"))
        .with("reading", reading)
        .with("note", None::<String>)
}

fn meters(count: i64) -> MemoryTable {
    MemoryTable::new("meters")
        .column("id", "integer", false)
        .column("site", "text", false)
        .column("reading", "numeric", true)
        .column("note", "text", true)
        .primary_key("id")
        .index(
            "meters_pkey",
            "CREATE UNIQUE INDEX meters_pkey ON public.meters USING btree (id)",
        )
        .rows((1..=count).map(|id| meter_row(id, Decimal::new(id * 125, 2))))
}

fn sites() -> MemoryTable {
    MemoryTable::new("sites")
        .column("code", "character varying", false)
        .primary_key("code")
        .row(Row::new().with("code", "north"))
        .row(Row::new().with("code", "south"))
}

#[tokio::test]
async fn test_transfer_copies_every_table() {
    let (server, _manager, executor) = common::setup().await;
    let source = MemorySource::new().table(meters(5)).table(sites());
    let pipeline = MigrationPipeline::new(source, executor).with_progress(false);

    let report = pipeline.transfer_data(2).await.unwrap();

    assert_eq!(report.total_transferred(), 7);
    let meters_report = report.table("meters").unwrap();
    assert_eq!(meters_report.total_rows, 5);
    assert_eq!(meters_report.transferred, 5);
    assert_eq!(report.table("sites").unwrap().transferred, 2);
    let order: Vec<_> = report.tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(order, vec!["meters", "sites"]);

    assert_eq!(server.documents(TEST_DATABASE, "meters").len(), 5);
    assert_eq!(server.documents(TEST_DATABASE, "sites").len(), 2);

    // 5 rows in pages of 2, then 2 rows in one page
    assert_eq!(pipeline.source().batch_queries(), 4);
    assert_eq!(pipeline.source().count_queries(), 2);
    assert_eq!(server.operation_count(OperationKind::InsertMany), 4);
}

#[tokio::test]
async fn test_transferred_documents_convert_values() {
    let (server, _manager, executor) = common::setup().await;
    let pipeline =
        MigrationPipeline::new(MemorySource::new().table(meters(1)), executor).with_progress(false);

    pipeline.transfer_data(100).await.unwrap();

    let stored = &server.documents(TEST_DATABASE, "meters")[0];
    assert_eq!(stored.get("id"), Some(&Bson::Int32(1)));
    assert_eq!(stored.get_str("site").unwrap(), "site-1");
    assert_eq!(stored.get_f64("reading").unwrap(), 1.25);
    assert_eq!(stored.get("note"), Some(&Bson::Null));
    assert!(stored.contains_key("_id"));
    assert!(stored.contains_key("_created_at"));
}

#[tokio::test]
async fn test_transfer_into_other_database() {
    let (server, _manager, executor) = common::setup().await;
    let pipeline = MigrationPipeline::new(MemorySource::new().table(sites()), executor)
        .into_database("warehouse")
        .with_progress(false);

    pipeline.transfer_data(10).await.unwrap();

    assert_eq!(server.documents("warehouse", "sites").len(), 2);
    assert!(server.documents(TEST_DATABASE, "sites").is_empty());
}

#[tokio::test]
async fn test_rerunning_a_transfer_appends_duplicates() {
    let (server, _manager, executor) = common::setup().await;
    let pipeline =
        MigrationPipeline::new(MemorySource::new().table(sites()), executor).with_progress(false);

    pipeline.transfer_data(10).await.unwrap();
    pipeline.transfer_data(10).await.unwrap();

    assert_eq!(server.documents(TEST_DATABASE, "sites").len(), 4);
}

#[tokio::test]
async fn test_empty_table_is_reported_without_queries() {
    let (server, _manager, executor) = common::setup().await;
    let source = MemorySource::new().table(MemoryTable::new("archive").column("id", "integer", false));
    let pipeline = MigrationPipeline::new(source, executor).with_progress(false);

    let report = pipeline.transfer_data(10).await.unwrap();

    let archive = report.table("archive").unwrap();
    assert_eq!(archive.total_rows, 0);
    assert_eq!(archive.transferred, 0);
    assert_eq!(pipeline.source().batch_queries(), 0);
    assert!(server.collection_names(TEST_DATABASE).is_empty());
}

#[tokio::test]
async fn test_insert_failure_stops_the_transfer() {
    let (server, _manager, executor) = common::setup().await;
    server.inject(
        Fault::new(
            FaultTarget::Operation(OperationKind::InsertMany),
            StoreError::command("document failed validation"),
        )
        .after(1),
    );
    let source = MemorySource::new().table(meters(5)).table(sites());
    let pipeline = MigrationPipeline::new(source, executor).with_progress(false);

    let err = pipeline.transfer_data(2).await.unwrap_err();

    assert!(matches!(err, AppError::Operation { ref verb, .. } if verb == "insert_many"));
    // The first page stays; nothing after the failure is attempted
    assert_eq!(server.documents(TEST_DATABASE, "meters").len(), 2);
    assert!(server.documents(TEST_DATABASE, "sites").is_empty());
}

#[tokio::test]
async fn test_schema_export() {
    let (_server, _manager, executor) = common::setup().await;
    let pipeline = MigrationPipeline::new(MemorySource::new().table(meters(0)).table(sites()), executor);

    let schema = pipeline.schema().await.unwrap();

    let meters = schema.table("meters").unwrap();
    assert_eq!(meters.columns.len(), 4);
    assert_eq!(meters.primary_keys, vec!["id"]);
    assert_eq!(meters.indexes.len(), 1);
    assert!(meters.indexes[0]["meters_pkey"].starts_with("CREATE UNIQUE INDEX"));

    let json: serde_json::Value = serde_json::from_str(&schema.to_json_pretty().unwrap()).unwrap();
    assert_eq!(json["meters"]["columns"][0]["name"], "id");
    assert_eq!(json["meters"]["columns"][0]["type"], "integer");
    assert_eq!(json["meters"]["columns"][0]["nullable"], false);
    assert_eq!(json["sites"]["primary_keys"][0], "code");
    assert!(json["sites"]["indexes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_schema_export_needs_only_the_source() {
    let schema = export_schema(&MemorySource::new().table(sites())).await.unwrap();

    assert_eq!(schema.tables.len(), 1);
    assert_eq!(schema.table("sites").unwrap().columns[0].data_type, "character varying");
}

#[test]
fn test_row_conversion_handles_nested_values() {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let row = Row::new()
        .with("big", 5_000_000_000_i64)
        .with("flag", true)
        .with(
            "readings",
            SqlValue::Array(vec![
                SqlValue::Decimal(Decimal::new(15, 1)),
                SqlValue::Int(2),
            ]),
        )
        .with("payload", SqlValue::Json(serde_json::json!({ "k": [1, 2.5, "x"] })))
        .with("seen_at", SqlValue::Timestamp(at))
        .with("blob", SqlValue::Bytes(vec![1, 2, 3]));

    let document = row_to_document(row);

    assert_eq!(document.get("big"), Some(&Bson::Int64(5_000_000_000)));
    assert!(document.get_bool("flag").unwrap());
    let readings = document.get_array("readings").unwrap();
    assert_eq!(readings[0], Bson::Double(1.5));
    assert_eq!(readings[1], Bson::Int32(2));
    let payload = document.get_document("payload").unwrap();
    let items = payload.get_array("k").unwrap();
    assert_eq!(items[0], Bson::Int32(1));
    assert_eq!(items[1], Bson::Double(2.5));
    assert_eq!(
        document.get_datetime("seen_at").unwrap().timestamp_millis(),
        at.timestamp_millis()
    );
    assert!(matches!(document.get("blob"), Some(Bson::Binary(_))));
    let keys: Vec<_> = document.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["big", "flag", "readings", "payload", "seen_at", "blob"]);
}

#[tokio::test]
async fn test_unknown_table_is_a_relational_error() {
    let source = MemorySource::new();
    let err = docbridge::migration::RelationalSource::row_count(&source, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Relational(_)));
}

#[tokio::test]
async fn test_schema_export_writes_json_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    let schema = export_schema(&MemorySource::new().table(meters(0))).await.unwrap();

    schema.write_to(&path).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["meters"]["primary_keys"][0], "id");
    assert_eq!(written["meters"]["columns"].as_array().unwrap().len(), 4);
}

#[cfg(feature = "postgresql")]
#[test]
fn test_unlisted_column_types_are_selected_as_text() {
    use docbridge::migration::postgres::{decodes_natively, select_list};

    for native in ["int4", "numeric", "timestamptz", "jsonb", "varchar", "_int4", "_uuid"] {
        assert!(decodes_natively(native), "{native}");
    }
    for textual in ["interval", "inet", "money", "int4range", "mood", "_mood", "char"] {
        assert!(!decodes_natively(textual), "{textual}");
    }

    let columns = vec![
        ("id".to_owned(), "int4".to_owned()),
        ("status".to_owned(), "mood".to_owned()),
        ("Span \"x\"".to_owned(), "interval".to_owned()),
    ];
    assert_eq!(
        select_list(&columns),
        r#""id", "status"::text AS "status", "Span ""x"""::text AS "Span ""x""""#
    );
    assert_eq!(select_list(&[]), "*");
}
