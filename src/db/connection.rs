//! Database connection management using sqlx

use crate::error::{NlqError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub type DbPool = PgPool;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await
        .map_err(|e| NlqError::Database(format!("Failed to connect to PostgreSQL: {}", e)))?;

    // Test the connection
    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|e| NlqError::Database(format!("Connection test failed: {}", e)))?;

    info!("Connected to PostgreSQL");
    Ok(pool)
}
