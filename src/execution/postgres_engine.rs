//! Postgres-protocol engine (Redshift, PostgreSQL)
//!
//! Statements go over the simple query protocol, so every value arrives as
//! text and is converted to JSON by its column type. Each one runs in its own
//! read-only transaction that is rolled back afterwards.

use crate::db::DbPool;
use crate::execution::engine::QueryEngine;
use crate::execution::error_classifier::classify_sqlx;
use crate::execution::result::{ExecutionErrorKind, ExecutionFailure, ResultSet};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::warn;

/// Opens the transaction every statement runs in
pub const READ_ONLY_BEGIN: &str = "BEGIN READ ONLY";

pub struct PostgresEngine {
    pool: DbPool,
}

impl PostgresEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Render a text-format value by its Postgres type name
pub fn text_to_json(type_name: &str, text: &str) -> serde_json::Value {
    match type_name.to_ascii_uppercase().as_str() {
        "INT2" | "INT4" | "INT8" | "SMALLINT" | "INTEGER" | "BIGINT" => text
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| serde_json::Value::String(text.to_string())),
        "FLOAT4" | "FLOAT8" | "REAL" | "DOUBLE PRECISION" => text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(text.to_string())),
        // NUMERIC stays a string so precision survives
        "BOOL" | "BOOLEAN" => match text {
            "t" | "true" => serde_json::Value::Bool(true),
            "f" | "false" => serde_json::Value::Bool(false),
            _ => serde_json::Value::String(text.to_string()),
        },
        _ => serde_json::Value::String(text.to_string()),
    }
}

fn row_values(row: &PgRow) -> Result<Vec<serde_json::Value>, ExecutionFailure> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index).map_err(|e| classify_sqlx(&e))?;
        if raw.is_null() {
            values.push(serde_json::Value::Null);
            continue;
        }
        let text = raw.as_str().map_err(|e| {
            ExecutionFailure::new(
                ExecutionErrorKind::Syntax,
                format!("Could not decode column {}: {}", column.name(), e),
            )
        })?;
        values.push(text_to_json(column.type_info().name(), text));
    }
    Ok(values)
}

#[async_trait]
impl QueryEngine for PostgresEngine {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn run(&self, sql: &str) -> Result<ResultSet, ExecutionFailure> {
        let mut tx = self
            .pool
            .begin_with(READ_ONLY_BEGIN)
            .await
            .map_err(|e| classify_sqlx(&e))?;

        let outcome = sqlx::Executor::fetch_all(&mut *tx, sqlx::raw_sql(sql)).await;

        // Dropping the transaction (timeout) also rolls back
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Rollback after query failed");
        }
        let rows = outcome.map_err(|e| classify_sqlx(&e))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let rows = rows.iter().map(row_values).collect::<Result<Vec<_>, _>>()?;
        Ok(ResultSet::new(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_to_json() {
        assert_eq!(text_to_json("INT8", "42"), json!(42));
        assert_eq!(text_to_json("FLOAT8", "1.5"), json!(1.5));
        assert_eq!(text_to_json("NUMERIC", "12.30"), json!("12.30"));
        assert_eq!(text_to_json("BOOL", "t"), json!(true));
        assert_eq!(text_to_json("TIMESTAMP", "2024-05-01 00:00:00"), json!("2024-05-01 00:00:00"));
        assert_eq!(text_to_json("FLOAT8", "NaN"), json!("NaN"));
    }
}
