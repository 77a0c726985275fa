//! Schema catalog reader for the PostgreSQL information_schema.
//!
//! Four parameterless catalog queries, joined into the column-level view in
//! memory. Every call reads the live catalog; nothing is cached.

use crate::catalog::{ColumnDescriptor, ForeignKeyRef, SchemaSnapshot, TableDescriptor};
use crate::error::{NlqError, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Read boundary for pipeline stages that need a schema snapshot.
#[async_trait]
pub trait SchemaReader: Send + Sync {
    async fn read_schema(&self) -> Result<SchemaSnapshot>;
}

pub struct SchemaRepository {
    pool: PgPool,
}

#[derive(Debug, Clone)]
struct RawColumn {
    table_name: String,
    column_name: String,
    data_type: String,
    is_nullable: String,
}

#[derive(Debug, Clone)]
struct RawForeignKey {
    table_name: String,
    column_name: String,
    referenced_table: String,
    referenced_column: String,
}

impl SchemaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_table_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = 'public'
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NlqError::Introspection(format!("Failed to load table names: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_get("table_name").unwrap_or_default())
            .collect())
    }

    async fn load_columns(&self) -> Result<Vec<RawColumn>> {
        let rows = sqlx::query(
            r#"
            SELECT table_name, column_name, data_type, is_nullable
            FROM information_schema.columns
            WHERE table_schema = 'public'
            ORDER BY table_name, ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NlqError::Introspection(format!("Failed to load columns: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| RawColumn {
                table_name: row.try_get("table_name").unwrap_or_default(),
                column_name: row.try_get("column_name").unwrap_or_default(),
                data_type: row.try_get("data_type").unwrap_or_default(),
                is_nullable: row.try_get("is_nullable").unwrap_or_default(),
            })
            .collect())
    }

    async fn load_primary_keys(&self) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT tc.table_name, kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
            WHERE tc.table_schema = 'public'
              AND tc.constraint_type = 'PRIMARY KEY'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NlqError::Introspection(format!("Failed to load primary keys: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.try_get("table_name").unwrap_or_default(),
                    row.try_get("column_name").unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn load_foreign_keys(&self) -> Result<Vec<RawForeignKey>> {
        let rows = sqlx::query(
            r#"
            SELECT
                tc.table_name,
                kcu.column_name,
                ccu.table_name AS referenced_table,
                ccu.column_name AS referenced_column
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
            JOIN information_schema.constraint_column_usage ccu
              ON tc.constraint_name = ccu.constraint_name
            WHERE tc.table_schema = 'public'
              AND tc.constraint_type = 'FOREIGN KEY'
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NlqError::Introspection(format!("Failed to load foreign keys: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| RawForeignKey {
                table_name: row.try_get("table_name").unwrap_or_default(),
                column_name: row.try_get("column_name").unwrap_or_default(),
                referenced_table: row.try_get("referenced_table").unwrap_or_default(),
                referenced_column: row.try_get("referenced_column").unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl SchemaReader for SchemaRepository {
    async fn read_schema(&self) -> Result<SchemaSnapshot> {
        let tables = self.load_table_names().await?;
        let columns = self.load_columns().await?;
        let primary_keys = self.load_primary_keys().await?;
        let foreign_keys = self.load_foreign_keys().await?;

        let snapshot = assemble_snapshot(tables, columns, primary_keys, foreign_keys);
        debug!("Read schema snapshot with {} tables", snapshot.tables.len());
        Ok(snapshot)
    }
}

/// Join the raw catalog rows into the snapshot. Tables come out sorted by
/// name; columns keep the order they were given in.
fn assemble_snapshot(
    mut tables: Vec<String>,
    columns: Vec<RawColumn>,
    primary_keys: Vec<(String, String)>,
    foreign_keys: Vec<RawForeignKey>,
) -> SchemaSnapshot {
    tables.sort();

    let pk_set: HashSet<(String, String)> = primary_keys.into_iter().collect();

    let mut fk_map: HashMap<(String, String), ForeignKeyRef> = HashMap::new();
    for fk in foreign_keys {
        fk_map.insert(
            (fk.table_name, fk.column_name),
            ForeignKeyRef {
                referenced_table: fk.referenced_table,
                referenced_column: fk.referenced_column,
            },
        );
    }

    let mut columns_by_table: HashMap<String, Vec<RawColumn>> = HashMap::new();
    for col in columns {
        columns_by_table
            .entry(col.table_name.clone())
            .or_default()
            .push(col);
    }

    let tables = tables
        .into_iter()
        .map(|table_name| {
            let raw_columns = columns_by_table.remove(&table_name).unwrap_or_default();
            let columns = raw_columns
                .into_iter()
                .map(|col| {
                    let key = (table_name.clone(), col.column_name.clone());
                    ColumnDescriptor {
                        is_primary: pk_set.contains(&key),
                        foreign_key: fk_map.remove(&key),
                        nullable: col.is_nullable == "YES",
                        name: col.column_name,
                        data_type: col.data_type,
                    }
                })
                .collect();

            TableDescriptor {
                name: table_name,
                columns,
            }
        })
        .collect();

    SchemaSnapshot { tables }
}
