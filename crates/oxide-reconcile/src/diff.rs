//! Set differences between two catalogs of the same kind.

use crate::catalog::Catalog;
use crate::normalize::same_sql;

/// Names added, removed and modified between an actual and a desired catalog.
///
/// All lists are in lexical name order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectDiff {
    /// Present in desired, absent in actual.
    pub added: Vec<String>,
    /// Present in actual, absent in desired.
    pub removed: Vec<String>,
    /// Present in both with differing normalized definitions.
    pub modified: Vec<String>,
}

impl ObjectDiff {
    /// Compares `actual` against `desired`.
    #[must_use]
    pub fn between(actual: &Catalog, desired: &Catalog) -> Self {
        let added = desired
            .names()
            .filter(|name| !actual.contains(name))
            .map(str::to_string)
            .collect();

        let removed = actual
            .names()
            .filter(|name| !desired.contains(name))
            .map(str::to_string)
            .collect();

        let modified = desired
            .iter()
            .filter(|wanted| {
                actual
                    .get(&wanted.name)
                    .is_some_and(|existing| !same_sql(&existing.sql, &wanted.sql))
            })
            .map(|o| o.name.clone())
            .collect();

        Self {
            added,
            removed,
            modified,
        }
    }

    /// Returns true if both catalogs are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Names to drop when modified objects are recreated: removed plus modified.
    #[must_use]
    pub fn to_drop(&self) -> Vec<String> {
        merge_sorted(&self.removed, &self.modified)
    }

    /// Names to create when modified objects are recreated: added plus modified.
    #[must_use]
    pub fn to_create(&self) -> Vec<String> {
        merge_sorted(&self.added, &self.modified)
    }
}

fn merge_sorted(a: &[String], b: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = a.iter().chain(b).cloned().collect();
    merged.sort();
    merged.dedup();
    merged
}
