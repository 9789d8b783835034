#![allow(dead_code)]

use oxide_reconcile::operation::Plan;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

/// A database file living in its own temporary directory.
pub struct TestDb {
    pub pool: SqlitePool,
    _dir: TempDir,
}

pub async fn file_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to open test database");
    TestDb { pool, _dir: dir }
}

pub async fn exec(pool: &SqlitePool, sql: &str) {
    sqlx::raw_sql(sql)
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e:?}"));
}

/// Every user object as `(type, name, sql)`, in a stable order.
pub async fn schema_rows(pool: &SqlitePool) -> Vec<(String, String, String)> {
    sqlx::query_as(
        "SELECT type, name, sql FROM sqlite_master \
         WHERE sql IS NOT NULL AND substr(name, 1, 7) != 'sqlite_' \
         ORDER BY type, name",
    )
    .fetch_all(pool)
    .await
    .expect("Failed to read sqlite_master")
}

pub fn sql_of(plan: &Plan) -> Vec<String> {
    plan.iter().map(|op| op.sql().to_string()).collect()
}
