//! Plan operations.
//!
//! An [`Operation`] is one literal SQL statement. A [`Plan`] is the ordered
//! list of operations that moves a database to the desired schema; the order
//! is the execution order and must not be changed.

use std::fmt;

use serde::Serialize;

use crate::normalize::normalize;

/// A single SQL statement to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Operation(String);

impl Operation {
    /// Wraps a SQL statement.
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// The statement exactly as it will be executed.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.0
    }

    /// A normalized, single-line rendering for previews and comparisons.
    #[must_use]
    pub fn normalized(&self) -> String {
        normalize(&self.0)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Operation {
    fn from(sql: String) -> Self {
        Self(sql)
    }
}

impl From<&str> for Operation {
    fn from(sql: &str) -> Self {
        Self(sql.to_string())
    }
}

/// An ordered list of operations. Empty means nothing to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an operation.
    pub fn push(&mut self, operation: impl Into<Operation>) {
        self.operations.push(operation.into());
    }

    /// Operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Iterates over operations in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }

    /// Number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if no changes are needed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Normalized renderings of every operation, in order.
    #[must_use]
    pub fn normalized(&self) -> Vec<String> {
        self.operations.iter().map(Operation::normalized).collect()
    }
}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Operation;
    type IntoIter = std::slice::Iter<'a, Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

impl IntoIterator for Plan {
    type Item = Operation;
    type IntoIter = std::vec::IntoIter<Operation>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.into_iter()
    }
}

impl From<Vec<Operation>> for Plan {
    fn from(operations: Vec<Operation>) -> Self {
        Self { operations }
    }
}
