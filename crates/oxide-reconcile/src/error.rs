//! Error types for schema reconciliation.

use std::fmt;

/// Schema objects a plan refused to drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deletion {
    /// Tables present in the database but absent from the desired schema.
    Tables(Vec<String>),
    /// Columns of a rebuilt table absent from its desired definition.
    Columns {
        /// The table being rebuilt.
        table: String,
        /// Columns that would be lost.
        columns: Vec<String>,
    },
}

impl fmt::Display for Deletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tables(tables) => write!(f, "will not remove tables: {}", tables.join(", ")),
            Self::Columns { table, columns } => write!(
                f,
                "will not remove columns from table {}: {}",
                table,
                columns.join(", ")
            ),
        }
    }
}

/// Errors that can occur while planning or applying a reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The desired schema failed to execute in the scratch database.
    #[error("Invalid schema: {0}")]
    SchemaLoad(#[source] sqlx::Error),

    /// The plan would drop tables or columns but deletions are disallowed.
    #[error("Deletion not allowed: {0}")]
    DeletionNotAllowed(Deletion),

    /// Reading object or column metadata failed.
    #[error("Failed to query {what}: {source}")]
    CatalogQuery {
        /// What was being read (e.g. "tables", "columns of users").
        what: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// The declared name could not be located in a table's defining statement.
    #[error("Cannot locate the table name in the definition of '{table}'")]
    TableDefinition {
        /// Table whose statement could not be rewritten.
        table: String,
    },

    /// An operation failed while applying a plan. The transaction was rolled back.
    #[error("Operation {} failed ({statement}): {source}", .index + 1)]
    Apply {
        /// Zero-based position of the failing operation in the plan.
        index: usize,
        /// SQL text of the failing operation.
        statement: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Database error outside of a specific operation (connection, pragmas, commit).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ReconcileError {
    /// Returns true if this is the deletion guard refusing to drop data.
    ///
    /// Callers can retry with deletions allowed when this holds.
    #[must_use]
    pub fn is_deletion_refused(&self) -> bool {
        matches!(self, Self::DeletionNotAllowed(_))
    }

    pub(crate) fn catalog(what: impl Into<String>, source: sqlx::Error) -> Self {
        Self::CatalogQuery {
            what: what.into(),
            source,
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
