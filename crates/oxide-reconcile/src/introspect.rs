//! Catalog queries.
//!
//! The [`Introspector`] reads object definitions and column metadata from a
//! SQLite database. It behaves the same whether it points at the live
//! database or at the scratch database holding the desired schema.

use sqlx::sqlite::SqlitePool;
use tracing::trace;

use crate::catalog::{Catalog, ColumnInfo, Columns, ObjectKind, SchemaObject, Snapshot};
use crate::error::{ReconcileError, Result};

/// SQL listing the objects of one kind, skipping engine-internal objects.
///
/// Objects named `sqlite_*` are reserved (`sqlite_sequence`, `sqlite_stat1`,
/// automatic indices) and rows without `sql` are created implicitly by the
/// engine, so neither can be recreated from a statement.
pub const LIST_OBJECTS_SQL: &str = r#"
SELECT name, tbl_name, sql
FROM sqlite_master
WHERE type = ?
  AND sql IS NOT NULL
  AND substr(name, 1, 7) != 'sqlite_'
ORDER BY name
"#;

/// SQL listing the columns of a table in ordinal order.
pub const LIST_COLUMNS_SQL: &str = r#"
SELECT cid, name, type, "notnull", dflt_value, pk
FROM pragma_table_info(?)
ORDER BY cid
"#;

/// Reads catalogs from a database.
#[derive(Debug, Clone)]
pub struct Introspector {
    pool: SqlitePool,
}

impl Introspector {
    /// Creates an introspector over the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Lists all objects of `kind`.
    pub async fn list(&self, kind: ObjectKind) -> Result<Catalog> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(LIST_OBJECTS_SQL)
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ReconcileError::catalog(format!("{kind} catalog"), e))?;

        trace!(kind = %kind, count = rows.len(), "Listed objects");

        let mut catalog = Catalog::new(kind);
        catalog.extend(
            rows.into_iter()
                .map(|(name, table, sql)| SchemaObject { name, table, sql }),
        );
        Ok(catalog)
    }

    /// Lists all tables.
    pub async fn list_tables(&self) -> Result<Catalog> {
        self.list(ObjectKind::Table).await
    }

    /// Lists all indices.
    pub async fn list_indices(&self) -> Result<Catalog> {
        self.list(ObjectKind::Index).await
    }

    /// Lists all views.
    pub async fn list_views(&self) -> Result<Catalog> {
        self.list(ObjectKind::View).await
    }

    /// Lists all triggers.
    pub async fn list_triggers(&self) -> Result<Catalog> {
        self.list(ObjectKind::Trigger).await
    }

    /// Reads tables, indices, views and triggers, in that order.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot {
            tables: self.list_tables().await?,
            indices: self.list_indices().await?,
            views: self.list_views().await?,
            triggers: self.list_triggers().await?,
        })
    }

    /// Lists the columns of `table`. Unknown tables yield no columns.
    pub async fn list_columns(&self, table: &str) -> Result<Columns> {
        let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
            sqlx::query_as(LIST_COLUMNS_SQL)
                .bind(table)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| ReconcileError::catalog(format!("columns of {table}"), e))?;

        Ok(Columns::new(
            rows.into_iter()
                .map(
                    |(cid, name, declared_type, not_null, default_value, primary_key)| ColumnInfo {
                        cid,
                        name,
                        declared_type,
                        not_null: not_null != 0,
                        default_value,
                        primary_key,
                    },
                )
                .collect(),
        ))
    }
}
