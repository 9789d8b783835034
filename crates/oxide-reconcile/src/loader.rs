//! Materializes a desired schema into a scratch database.
//!
//! The schema text is handed to SQLite untouched; the engine is the only
//! parser. Whatever SQLite stores in its catalog afterwards is what gets
//! compared against the live database.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::debug;

use crate::error::{ReconcileError, Result};
use crate::introspect::Introspector;

/// Connection URL of the scratch database.
const MEMORY_URL: &str = "sqlite::memory:";

/// A private in-memory database holding the desired schema.
///
/// Each connection to `:memory:` gets its own database, so the pool is pinned
/// to a single connection that is never recycled.
#[derive(Debug)]
pub struct EphemeralSchema {
    pool: SqlitePool,
}

impl EphemeralSchema {
    /// Executes `ddl` against a fresh, empty database.
    ///
    /// Fails with [`ReconcileError::SchemaLoad`] if SQLite rejects any statement.
    pub async fn load(ddl: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect(MEMORY_URL)
            .await?;

        debug!(bytes = ddl.len(), "Loading desired schema");

        if ddl.trim().is_empty() {
            return Ok(Self { pool });
        }

        if let Err(e) = sqlx::raw_sql(ddl).execute(&pool).await {
            pool.close().await;
            return Err(ReconcileError::SchemaLoad(e));
        }

        Ok(Self { pool })
    }

    /// Returns an introspector over the scratch database.
    #[must_use]
    pub fn introspector(&self) -> Introspector {
        Introspector::new(self.pool.clone())
    }

    /// Discards the scratch database.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_valid_schema() {
        let schema = EphemeralSchema::load(
            r#"
            CREATE TABLE "Node" (A TEXT, C TEXT);
            CREATE INDEX IF NOT EXISTS idx_node_a ON "Node" (A);
            "#,
        )
        .await
        .unwrap();

        let introspector = schema.introspector();
        let tables = introspector.list_tables().await.unwrap();
        assert!(tables.contains("Node"));
        let indices = introspector.list_indices().await.unwrap();
        assert!(indices.contains("idx_node_a"));

        schema.close().await;
    }

    #[tokio::test]
    async fn test_load_keeps_state_across_queries() {
        let schema = EphemeralSchema::load("CREATE TABLE a (x); CREATE TABLE b (y);")
            .await
            .unwrap();
        let introspector = schema.introspector();

        for _ in 0..3 {
            assert_eq!(introspector.list_tables().await.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_load_rejects_trailing_comma() {
        let result = EphemeralSchema::load(
            r#"
            CREATE TABLE "Node" (
                A TEXT,
                x TEXT DEFAULT 'x', -- trailing comma
            );
            "#,
        )
        .await;

        assert!(matches!(result, Err(ReconcileError::SchemaLoad(_))));
    }

    #[tokio::test]
    async fn test_load_empty_schema() {
        let schema = EphemeralSchema::load("").await.unwrap();
        assert!(schema.introspector().list_tables().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let first = EphemeralSchema::load("CREATE TABLE only_here (x);")
            .await
            .unwrap();
        let second = EphemeralSchema::load("").await.unwrap();

        assert_eq!(first.introspector().list_tables().await.unwrap().len(), 1);
        assert!(second.introspector().list_tables().await.unwrap().is_empty());
    }
}
