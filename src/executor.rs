//! Bounded execution of validated statements.
//!
//! The statement is final text by the time it reaches this layer; no
//! parameter substitution happens here. Row values are decoded to JSON by
//! declared column type, with unknown types degrading to strings.

use crate::error::{NlqError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, PgPool, Row, TypeInfo};
use std::sync::Arc;
use tracing::{debug, info};

/// One result row, column name to JSON value in statement column order.
pub type RowMap = serde_json::Map<String, Value>;

/// Tabular query boundary over the database.
#[async_trait]
pub trait TabularBackend: Send + Sync {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<RowMap>>;
}

pub struct PgBackend {
    pool: PgPool,
}

impl PgBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TabularBackend for PgBackend {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<RowMap>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| NlqError::Execution(format!("Query execution failed: {}", e)))?;

        Ok(rows.iter().map(row_to_map).collect())
    }
}

fn row_to_map(row: &PgRow) -> RowMap {
    let mut map = RowMap::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = column_value(row, idx, column.type_info().name());
        map.insert(column.name().to_string(), value);
    }
    map
}

fn column_value(row: &PgRow, idx: usize, type_name: &str) -> Value {
    match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v as f64))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        // NUMERIC keeps full precision by rendering as a string.
        "NUMERIC" => row
            .try_get::<Option<BigDecimal>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "UUID" => row
            .try_get::<Option<Uuid>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "TIME" => row
            .try_get::<Option<NaiveTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::String(v.to_rfc3339()))
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

/// Result rows plus whether the caller-facing slice dropped anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<RowMap>,
    pub truncated: bool,
}

impl QueryResult {
    pub fn new(rows: Vec<RowMap>) -> Self {
        Self {
            rows,
            truncated: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep at most `limit` rows, marking the result truncated when any
    /// were dropped.
    pub fn truncate_to(&mut self, limit: usize) {
        if self.rows.len() > limit {
            self.rows.truncate(limit);
            self.truncated = true;
        }
    }
}

pub struct QueryExecutor {
    backend: Arc<dyn TabularBackend>,
}

impl QueryExecutor {
    pub fn new(backend: Arc<dyn TabularBackend>) -> Self {
        Self { backend }
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        debug!("Executing: {}", sql);
        let rows = self.backend.fetch_rows(sql).await?;
        info!("Query returned {} rows", rows.len());
        Ok(QueryResult::new(rows))
    }
}
