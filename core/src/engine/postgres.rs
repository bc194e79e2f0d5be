//! PostgreSQL engine adapter
//!
//! Wraps one `sqlx` connection behind the synchronous [`QueryEngine`]
//! contract. Each call blocks the calling thread on the runtime the engine was
//! created on, so it must be driven from a blocking context such as the
//! scheduler's worker.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Column, Connection, Either, Executor, Row, TypeInfo};
use tokio::runtime::Handle;
use uuid::Uuid;

use super::{EngineError, QueryEngine, QueryOutput};
use crate::config::DatabaseConfig;

pub struct PostgresEngine {
    connection: Mutex<PgConnection>,
    runtime: Handle,
}

impl PostgresEngine {
    /// Open the connection described by `config`.
    ///
    /// Must be called from within a Tokio runtime; that runtime is used for
    /// every later [`QueryEngine::execute`] call.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("No database URL configured (set database.url or SQLRUN_DATABASE__URL)")?;

        let connection = tokio::time::timeout(
            Duration::from_secs(config.connect_timeout_secs),
            PgConnection::connect(url),
        )
        .await
        .context("Timed out connecting to database")?
        .context("Failed to connect to database")?;

        tracing::info!("connected to database");

        Ok(Self {
            connection: Mutex::new(connection),
            runtime: Handle::current(),
        })
    }
}

impl QueryEngine for PostgresEngine {
    fn execute(&self, statement: &str) -> Result<QueryOutput, EngineError> {
        let mut connection = self
            .connection
            .lock()
            .map_err(|_| EngineError::new("database connection is unusable after a panic"))?;

        self.runtime
            .block_on(run_statement(&mut connection, statement))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => EngineError::new(db_err.message()),
            other => EngineError::new(other.to_string()),
        }
    }
}

async fn run_statement(
    connection: &mut PgConnection,
    statement: &str,
) -> Result<QueryOutput, EngineError> {
    let mut rows_affected: u64 = 0;
    let mut columns: Vec<String> = Vec::new();
    let mut cells: Vec<Vec<JsonValue>> = Vec::new();

    {
        let mut stream = sqlx::query(statement).fetch_many(&mut *connection);
        while let Some(step) = stream.try_next().await? {
            match step {
                Either::Left(done) => rows_affected += done.rows_affected(),
                Either::Right(row) => {
                    if columns.is_empty() {
                        columns = column_names(&row);
                    }
                    cells.push((0..row.len()).map(|i| decode_cell(&row, i)).collect());
                }
            }
        }
    }

    if cells.is_empty() {
        // Empty result sets still have columns; commands have none
        columns = connection
            .describe(statement)
            .await
            .map(|described| {
                described
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
    }

    Ok(shape_output(columns, cells, rows_affected))
}

/// Statements with a result set report their row count, commands report the
/// number of rows they touched.
fn shape_output(
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
    rows_affected: u64,
) -> QueryOutput {
    if columns.is_empty() {
        QueryOutput::affected(rows_affected)
    } else {
        QueryOutput::rows(columns, rows)
    }
}

fn column_names(row: &PgRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn decode_cell(row: &PgRow, index: usize) -> JsonValue {
    let type_name = row.columns()[index].type_info().name().to_string();

    let decoded: Result<Option<JsonValue>, sqlx::Error> = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(|v| v.map(JsonValue::from)),
        "INT2" => row.try_get::<Option<i16>, _>(index).map(|v| v.map(JsonValue::from)),
        "INT4" => row.try_get::<Option<i32>, _>(index).map(|v| v.map(JsonValue::from)),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(|v| v.map(JsonValue::from)),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index).map(|v| v.map(JsonValue::from)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(|v| v.map(JsonValue::from)),
        "JSON" | "JSONB" => row.try_get::<Option<JsonValue>, _>(index),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(index)
            .map(|v| v.map(|u| JsonValue::from(u.to_string()))),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(|v| v.map(|t| JsonValue::from(t.to_rfc3339()))),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| v.map(|t| JsonValue::from(t.to_string()))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(|v| v.map(|d| JsonValue::from(d.to_string()))),
        _ => row.try_get::<Option<String>, _>(index).map(|v| v.map(JsonValue::from)),
    };

    match decoded {
        Ok(value) => value.unwrap_or(JsonValue::Null),
        Err(_) => JsonValue::String(format!("<{}>", type_name.to_lowercase())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_output_for_result_sets() {
        let output = shape_output(
            vec!["id".to_string()],
            vec![vec![JsonValue::from(1)], vec![JsonValue::from(2)]],
            2,
        );
        assert_eq!(output.row_count, 2);
        assert_eq!(output.columns, vec!["id"]);

        // Empty result set keeps its columns and counts zero rows
        let output = shape_output(vec!["id".to_string()], Vec::new(), 0);
        assert_eq!(output.row_count, 0);
        assert_eq!(output.columns, vec!["id"]);
    }

    #[test]
    fn test_shape_output_for_commands() {
        let output = shape_output(Vec::new(), Vec::new(), 7);
        assert_eq!(output.row_count, 7);
        assert!(output.columns.is_empty());
        assert!(output.rows.is_empty());
    }

    async fn connect_test_engine() -> std::sync::Arc<PostgresEngine> {
        let config = DatabaseConfig {
            url: std::env::var("SQLRUN_DATABASE__URL").ok(),
            ..Default::default()
        };
        std::sync::Arc::new(PostgresEngine::connect(&config).await.unwrap())
    }

    async fn execute_all(
        engine: std::sync::Arc<PostgresEngine>,
        statements: &[&str],
    ) -> Vec<Result<QueryOutput, EngineError>> {
        let statements: Vec<String> = statements.iter().map(|s| s.to_string()).collect();
        tokio::task::spawn_blocking(move || {
            statements.iter().map(|s| engine.execute(s)).collect()
        })
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore] // Requires database to be running
    async fn test_keyword_in_string_literal_reports_affected_rows() {
        let engine = connect_test_engine().await;

        let outputs = execute_all(
            engine,
            &[
                "CREATE TEMP TABLE notes (id INT, note TEXT)",
                "INSERT INTO notes VALUES (1, 'a'), (2, 'b')",
                "UPDATE notes SET note = 'see RETURNING policy' WHERE id = 1",
            ],
        )
        .await;

        let update = outputs[2].as_ref().unwrap();
        assert_eq!(update.row_count, 1);
        assert!(update.columns.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore] // Requires database to be running
    async fn test_returning_without_space_fetches_rows() {
        let engine = connect_test_engine().await;

        let outputs = execute_all(
            engine,
            &[
                "CREATE TEMP TABLE items (id INT)",
                "INSERT INTO items VALUES (1), (2) RETURNING(id)",
            ],
        )
        .await;

        let insert = outputs[1].as_ref().unwrap();
        assert_eq!(insert.columns, vec!["id"]);
        assert_eq!(insert.rows, vec![vec![JsonValue::from(1)], vec![JsonValue::from(2)]]);
        assert_eq!(insert.row_count, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore] // Requires database to be running
    async fn test_execute_against_database() {
        let engine = connect_test_engine().await;

        let outputs = execute_all(engine, &["SELECT 1 AS one"]).await;
        let output = outputs[0].as_ref().unwrap();

        assert_eq!(output.columns, vec!["one"]);
        assert_eq!(output.rows, vec![vec![JsonValue::from(1)]]);
        assert_eq!(output.row_count, 1);
    }
}
