//! Plan application.
//!
//! The [`Applier`] executes a [`Plan`] verbatim inside one transaction. It does
//! not interpret the operations; their order is the planner's responsibility.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use sqlx::Connection;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, Result};
use crate::operation::Plan;

/// Connection settings changed for the duration of an apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pragmas {
    foreign_keys: bool,
    legacy_alter_table: bool,
}

impl Pragmas {
    /// Settings used while applying: a table rebuild passes through states
    /// that break foreign keys, and renaming the rebuilt table must leave
    /// views and triggers that reference it untouched.
    const APPLY: Self = Self {
        foreign_keys: false,
        legacy_alter_table: true,
    };

    async fn read(conn: &mut SqliteConnection) -> Result<Self> {
        let (foreign_keys,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&mut *conn)
            .await?;
        let (legacy_alter_table,): (i64,) = sqlx::query_as("PRAGMA legacy_alter_table")
            .fetch_one(&mut *conn)
            .await?;
        Ok(Self {
            foreign_keys: foreign_keys != 0,
            legacy_alter_table: legacy_alter_table != 0,
        })
    }

    async fn write(self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!(
            "PRAGMA foreign_keys = {}; PRAGMA legacy_alter_table = {};",
            on_off(self.foreign_keys),
            on_off(self.legacy_alter_table)
        );
        sqlx::raw_sql(&sql).execute(&mut *conn).await?;
        Ok(())
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "ON" } else { "OFF" }
}

/// A pooled connection whose session settings may differ from the pool's.
///
/// While dirty, dropping it closes the connection instead of returning it to
/// the pool. An apply future dropped mid-flight therefore never hands a
/// connection with foreign keys disabled to the next pool user.
struct ApplyConnection {
    conn: PoolConnection<Sqlite>,
    dirty: bool,
}

impl ApplyConnection {
    fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self { conn, dirty: false }
    }

    fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl Drop for ApplyConnection {
    fn drop(&mut self) {
        if self.dirty {
            debug!("Closing connection left with apply settings");
            self.conn.close_on_drop();
        }
    }
}

/// Executes plans against a database.
#[derive(Debug, Clone)]
pub struct Applier {
    pool: SqlitePool,
}

impl Applier {
    /// Creates an applier for the database behind `pool`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Applies every operation of `plan`, in order, all or nothing.
    ///
    /// Foreign key enforcement is suspended while the transaction runs and
    /// restored afterwards. If an operation fails the transaction is rolled
    /// back and [`ReconcileError::Apply`] identifies the operation.
    ///
    /// If the returned future is dropped before completion, the transaction
    /// is rolled back and the connection is closed rather than returned to
    /// the pool. For a single-connection `:memory:` pool that discards the
    /// database.
    pub async fn apply(&self, plan: &Plan) -> Result<()> {
        if plan.is_empty() {
            debug!("Empty plan, nothing to apply");
            return Ok(());
        }

        info!(operations = plan.len(), "Applying plan");

        let mut conn = ApplyConnection::new(self.pool.acquire().await?);
        let saved = Pragmas::read(conn.connection()).await?;

        // SQLite ignores `PRAGMA foreign_keys` inside a transaction.
        conn.dirty = true;
        Pragmas::APPLY.write(conn.connection()).await?;
        let result = execute(conn.connection(), plan).await;
        let restored = saved.write(conn.connection()).await;
        conn.dirty = restored.is_err();

        result?;
        restored?;

        info!(operations = plan.len(), "Plan applied successfully");
        Ok(())
    }
}

async fn execute(conn: &mut SqliteConnection, plan: &Plan) -> Result<()> {
    let mut tx = conn.begin().await?;

    for (index, operation) in plan.iter().enumerate() {
        debug!(index, sql = %operation.sql(), "Executing SQL");

        if let Err(source) = sqlx::raw_sql(operation.sql()).execute(&mut *tx).await {
            warn!(index, error = %source, "Operation failed, rolling back");
            tx.rollback().await?;
            return Err(ReconcileError::Apply {
                index,
                statement: operation.sql().to_string(),
                source,
            });
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Applies `plan` to the database behind `pool`.
pub async fn apply(pool: &SqlitePool, plan: &Plan) -> Result<()> {
    Applier::new(pool.clone()).apply(plan).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::time::Duration;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn table_names(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_apply_runs_operations_in_order() {
        let pool = create_test_pool().await;
        let plan = Plan::from(vec![
            Operation::new("CREATE TABLE a (x TEXT)"),
            Operation::new("INSERT INTO a (x) VALUES ('one')"),
            Operation::new("ALTER TABLE a RENAME TO b"),
        ]);

        Applier::new(pool.clone()).apply(&plan).await.unwrap();

        assert_eq!(table_names(&pool).await, vec!["b"]);
        let value: String = sqlx::query_scalar("SELECT x FROM b")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value, "one");
    }

    #[tokio::test]
    async fn test_apply_failure_rolls_back_everything() {
        let pool = create_test_pool().await;
        sqlx::raw_sql("CREATE TABLE existing (x)")
            .execute(&pool)
            .await
            .unwrap();

        let plan = Plan::from(vec![
            Operation::new("CREATE TABLE fresh (x)"),
            Operation::new("DROP TABLE existing"),
            Operation::new("DROP TABLE missing"),
        ]);

        let err = apply(&pool, &plan).await.unwrap_err();
        match err {
            ReconcileError::Apply {
                index, statement, ..
            } => {
                assert_eq!(index, 2);
                assert_eq!(statement, "DROP TABLE missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(table_names(&pool).await, vec!["existing"]);
    }

    #[tokio::test]
    async fn test_apply_suspends_and_restores_foreign_keys() {
        let pool = create_test_pool().await;
        sqlx::raw_sql(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE parent (id INTEGER PRIMARY KEY);
            CREATE TABLE child (parent_id INTEGER REFERENCES parent (id) ON DELETE CASCADE);
            INSERT INTO parent (id) VALUES (1);
            INSERT INTO child (parent_id) VALUES (1);
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        // A parent rebuild: with enforcement on, the drop would cascade to child.
        let plan = Plan::from(vec![
            Operation::new("CREATE TABLE parent_tmp (id INTEGER PRIMARY KEY, name TEXT)"),
            Operation::new("INSERT INTO parent_tmp (id) SELECT id FROM parent"),
            Operation::new("DROP TABLE parent"),
            Operation::new("ALTER TABLE parent_tmp RENAME TO parent"),
        ]);
        apply(&pool, &plan).await.unwrap();

        let children: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM child")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(children, 1);

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
        let legacy: i64 = sqlx::query_scalar("PRAGMA legacy_alter_table")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(legacy, 0);
    }

    #[tokio::test]
    async fn test_apply_keeps_views_on_rebuilt_table() {
        let pool = create_test_pool().await;
        sqlx::raw_sql(
            r#"
            CREATE TABLE t (a TEXT);
            CREATE VIEW v AS SELECT a FROM t;
            INSERT INTO t (a) VALUES ('kept');
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let plan = Plan::from(vec![
            Operation::new("CREATE TABLE t_tmp (a TEXT, b TEXT)"),
            Operation::new("INSERT INTO t_tmp (a) SELECT a FROM t"),
            Operation::new("DROP TABLE t"),
            Operation::new("ALTER TABLE t_tmp RENAME TO t"),
        ]);
        apply(&pool, &plan).await.unwrap();

        let value: String = sqlx::query_scalar("SELECT a FROM v")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(value, "kept");
    }

    #[tokio::test]
    async fn test_apply_empty_plan() {
        let pool = create_test_pool().await;
        apply(&pool, &Plan::new()).await.unwrap();
        assert!(table_names(&pool).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_apply_rolls_back_and_restores_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("cancel.db"))
            .create_if_missing(true)
            .foreign_keys(true);
        // Closing the cancelled connection waits for its running statement.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(120))
            .connect_with(options)
            .await
            .unwrap();
        sqlx::raw_sql("CREATE TABLE numbers (n INTEGER)")
            .execute(&pool)
            .await
            .unwrap();

        let plan = Plan::from(vec![Operation::new(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 3000000) \
             INSERT INTO numbers (n) SELECT n FROM seq",
        )]);
        let applier = Applier::new(pool.clone());
        let outcome = tokio::time::timeout(Duration::from_millis(100), applier.apply(&plan)).await;
        assert!(outcome.is_err(), "apply finished before the timeout");

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM numbers")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let foreign_keys: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(foreign_keys, 1);
        let legacy: i64 = sqlx::query_scalar("PRAGMA legacy_alter_table")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(legacy, 0);
    }
}
