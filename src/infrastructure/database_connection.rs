// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

        if !in_memory {
            // Create database file directory if it doesn't exist
            let db_path = database_url
                .strip_prefix("sqlite://")
                .or_else(|| database_url.strip_prefix("sqlite:"))
                .unwrap_or(database_url);
            let db_path = db_path.split('?').next().unwrap_or(db_path);

            if let Some(parent) = Path::new(db_path).parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            // Ensure the database file exists by creating it if necessary
            if !Path::new(db_path).exists() {
                tokio::fs::File::create(db_path).await?;
            }
        }

        // Every connection to `sqlite::memory:` is a separate database
        let max_connections = if in_memory { 1 } else { 10 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        let create_records_sql = r"
            CREATE TABLE IF NOT EXISTS enforcement_records (
                id TEXT PRIMARY KEY,
                agency TEXT NOT NULL,
                record_type TEXT NOT NULL,
                regulator_id TEXT NOT NULL,
                attrs TEXT NOT NULL,
                inserted_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE (agency, record_type, regulator_id)
            )
        ";

        let create_sessions_sql = r"
            CREATE TABLE IF NOT EXISTS scrape_sessions (
                session_id TEXT PRIMARY KEY,
                agency TEXT NOT NULL,
                record_type TEXT NOT NULL,
                status TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                last_updated_at DATETIME NOT NULL
            )
        ";

        let create_logs_sql = r"
            CREATE TABLE IF NOT EXISTS processing_logs (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                agency TEXT NOT NULL,
                record_type TEXT NOT NULL,
                batch_number INTEGER NOT NULL,
                items_found INTEGER NOT NULL,
                items_created INTEGER NOT NULL,
                items_updated INTEGER NOT NULL,
                items_existing INTEGER NOT NULL,
                items_failed INTEGER NOT NULL,
                items TEXT NOT NULL,
                batch_errors TEXT NOT NULL,
                created_at DATETIME NOT NULL
            )
        ";

        let create_indexes_sql = r"
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON scrape_sessions (status);
            CREATE INDEX IF NOT EXISTS idx_logs_session_id ON processing_logs (session_id, created_at);
        ";

        sqlx::query(create_records_sql).execute(&self.pool).await?;
        sqlx::query(create_sessions_sql).execute(&self.pool).await?;
        sqlx::query(create_logs_sql).execute(&self.pool).await?;
        sqlx::raw_sql(create_indexes_sql).execute(&self.pool).await?;

        Ok(())
    }
}
