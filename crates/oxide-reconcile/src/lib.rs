//! Declarative schema reconciliation for SQLite.
//!
//! `oxide-reconcile` brings a live SQLite database in line with a desired
//! schema written as plain DDL. Instead of a history of hand-written
//! migrations, the desired schema is the single source of truth:
//! - The DDL is validated by loading it into a private in-memory database
//! - The live catalog is diffed against it, object by object
//! - Tables that changed are rebuilt with their surviving data
//! - The resulting plan is applied in one transaction, all or nothing
//!
//! # Architecture
//!
//! - **Loader** - Loads the desired DDL into an ephemeral database
//! - **Introspector** - Reads `sqlite_master` and `pragma_table_info`
//! - **Planner** - Diffs catalogs and emits an ordered [`Plan`](operation::Plan)
//! - **Applier** - Executes a plan transactionally
//! - **Normalize** - Whitespace and quoting insensitive SQL comparison
//!
//! Tables, indices, views and triggers are compared by name and by the
//! normalized text of their defining statement. Indices, views and triggers
//! are dropped and recreated when they change. Tables are rebuilt: the new
//! definition is created under a temporary name, common columns are copied,
//! the original is dropped and the copy renamed into place.
//!
//! Dropping tables or columns loses data, so the planner refuses such plans
//! unless deletions are explicitly allowed.
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_reconcile::prelude::*;
//!
//! let pool = SqlitePoolOptions::new()
//!     .max_connections(1)
//!     .connect("sqlite:app.db")
//!     .await?;
//!
//! let plan = Planner::new(pool.clone())
//!     .allow_deletions(false)
//!     .plan("CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);")
//!     .await?;
//!
//! for (i, operation) in plan.iter().enumerate() {
//!     println!("{}: {}", i + 1, operation.normalized());
//! }
//!
//! Applier::new(pool).apply(&plan).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Preview and confirm the changes
//! oxide-reconcile app.db --schema schema.sql
//!
//! # Apply without asking, allowing tables and columns to be dropped
//! oxide-reconcile app.db --schema schema.sql --auto-apply --allow-deletions
//!
//! # Print the plan as JSON
//! cat schema.sql | oxide-reconcile app.db --json --auto-apply
//! ```

pub mod applier;
pub mod catalog;
pub mod diff;
pub mod error;
pub mod introspect;
pub mod loader;
pub mod normalize;
pub mod operation;
pub mod planner;
pub mod rebuild;

use sqlx::sqlite::SqlitePool;

use crate::error::Result;
use crate::operation::Plan;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::applier::Applier;
    pub use crate::catalog::{Catalog, ColumnInfo, Columns, ObjectKind, SchemaObject, Snapshot};
    pub use crate::error::{Deletion, ReconcileError, Result};
    pub use crate::introspect::Introspector;
    pub use crate::loader::EphemeralSchema;
    pub use crate::normalize::{normalize, same_sql};
    pub use crate::operation::{Operation, Plan};
    pub use crate::planner::Planner;
    pub use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
}

/// Plans and applies the changes that bring the database behind `pool` to `ddl`.
///
/// Returns the plan that was applied, which is empty when the database
/// already matches.
pub async fn migrate(pool: &SqlitePool, ddl: &str, allow_deletions: bool) -> Result<Plan> {
    let plan = planner::plan(pool, ddl, allow_deletions).await?;
    applier::apply(pool, &plan).await?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    #[tokio::test]
    async fn test_migrate_then_nothing_left() {
        let pool = create_test_pool().await;
        let ddl = "CREATE TABLE t (a TEXT); CREATE INDEX t_a ON t (a);";

        let applied = migrate(&pool, ddl, false).await.unwrap();
        assert_eq!(applied.len(), 2);

        let again = migrate(&pool, ddl, false).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_bracket_quoted_table_settles() {
        let pool = create_test_pool().await;
        migrate(&pool, "CREATE TABLE [my t] (a);", false).await.unwrap();

        let rebuilt = migrate(&pool, "CREATE TABLE [my t] (a, b);", false)
            .await
            .unwrap();
        assert_eq!(rebuilt.len(), 4);

        let again = migrate(&pool, "CREATE TABLE [my t] (a, b);", false)
            .await
            .unwrap();
        assert!(again.is_empty(), "unexpected plan: {:?}", again.normalized());

        let backticked = migrate(&pool, "CREATE TABLE `my t` (a, b);", false)
            .await
            .unwrap();
        assert!(backticked.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_view_becomes_table() {
        let pool = create_test_pool().await;
        migrate(&pool, "CREATE TABLE t (a); CREATE VIEW v AS SELECT a FROM t;", false)
            .await
            .unwrap();

        migrate(&pool, "CREATE TABLE t (a); CREATE TABLE v (b);", false)
            .await
            .unwrap();

        let tables = Introspector::new(pool.clone()).list_tables().await.unwrap();
        assert_eq!(tables.names().collect::<Vec<_>>(), vec!["t", "v"]);
        let views = Introspector::new(pool.clone()).list_views().await.unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_migrate_refuses_deletion() {
        let pool = create_test_pool().await;
        migrate(&pool, "CREATE TABLE t (a, b);", false).await.unwrap();

        let err = migrate(&pool, "CREATE TABLE t (a);", false)
            .await
            .unwrap_err();
        assert!(err.is_deletion_refused());

        let applied = migrate(&pool, "CREATE TABLE t (a);", true).await.unwrap();
        assert_eq!(applied.len(), 4);
    }
}
