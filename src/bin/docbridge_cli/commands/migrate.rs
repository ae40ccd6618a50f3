// ABOUTME: PostgreSQL migration commands for docbridge-cli
// ABOUTME: Paged data transfer into MongoDB and relational schema export
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 docbridge contributors

use std::path::Path;

use docbridge::errors::AppResult;
use docbridge::manager::ScopedConnection;

#[cfg(feature = "postgresql")]
pub async fn transfer(
    connection: &ScopedConnection,
    batch_size: usize,
    target_database: Option<String>,
    show_progress: bool,
) -> AppResult<()> {
    use docbridge::config::RelationalConfig;
    use docbridge::executor::OperationExecutor;
    use docbridge::migration::{MigrationPipeline, PostgresSource};

    let source = PostgresSource::connect(&RelationalConfig::from_env()?).await?;
    let mut pipeline = MigrationPipeline::new(source, OperationExecutor::new(connection.manager()))
        .with_progress(show_progress);
    if let Some(database) = target_database {
        pipeline = pipeline.into_database(database);
    }

    let result = pipeline.transfer_data(batch_size).await;
    pipeline.source().close().await;
    let report = result?;

    for table in &report.tables {
        println!("{:<32} {:>10} rows", table.table, table.transferred);
    }
    println!("Total: {} rows", report.total_transferred());
    Ok(())
}

#[cfg(not(feature = "postgresql"))]
pub async fn transfer(
    _connection: &ScopedConnection,
    _batch_size: usize,
    _target_database: Option<String>,
    _show_progress: bool,
) -> AppResult<()> {
    Err(docbridge::errors::AppError::UnsupportedOperation(
        "migration requires the postgresql feature".to_owned(),
    ))
}

#[cfg(feature = "postgresql")]
pub async fn schema(output: Option<&Path>) -> AppResult<()> {
    use docbridge::config::RelationalConfig;
    use docbridge::migration::{export_schema, PostgresSource, RelationalSource};

    let source = PostgresSource::connect(&RelationalConfig::from_env()?).await?;
    let export = export_schema(&source).await;
    source.close().await;
    let export = export?;

    match output {
        Some(path) => {
            export.write_to(path)?;
            tracing::info!("Schema written to {} ({})", path.display(), source.describe());
        }
        None => println!("{}", export.to_json_pretty()?),
    }
    Ok(())
}

#[cfg(not(feature = "postgresql"))]
pub async fn schema(_output: Option<&Path>) -> AppResult<()> {
    Err(docbridge::errors::AppError::UnsupportedOperation(
        "schema export requires the postgresql feature".to_owned(),
    ))
}
