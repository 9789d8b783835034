//! Reconciliation planner.
//!
//! Compares the live database with a desired schema and produces the ordered
//! [`Plan`] that transforms one into the other. Planning only reads from the
//! live database.
//!
//! Operations are emitted in this order:
//!
//! 1. indices and views whose name a new table takes over are dropped, then
//!    new tables are created;
//! 2. removed tables are dropped;
//! 3. modified tables are rebuilt (create temp, copy, drop, rename);
//! 4. removed or modified indices, views and triggers are dropped;
//! 5. added or modified indices, views and triggers are created.
//!
//! Dropping a table also drops its indices and triggers, and dropping a view
//! drops its triggers. Those objects are never dropped explicitly, and the
//! ones still wanted are recreated in step 5 even when unchanged.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::catalog::{ObjectKind, Snapshot};
use crate::diff::ObjectDiff;
use crate::error::{Deletion, ReconcileError, Result};
use crate::introspect::Introspector;
use crate::loader::EphemeralSchema;
use crate::operation::Plan;
use crate::rebuild::{TableRebuild, drop_sql};

/// Kinds recreated rather than altered, in emission order.
const DEPENDENT_KINDS: [ObjectKind; 3] = [
    ObjectKind::Index,
    ObjectKind::View,
    ObjectKind::Trigger,
];

/// Computes reconciliation plans against a live database.
#[derive(Debug, Clone)]
pub struct Planner {
    pool: SqlitePool,
    allow_deletions: bool,
    seed: Option<u64>,
}

impl Planner {
    /// Creates a planner for the database behind `pool`. Deletions are refused by default.
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            allow_deletions: false,
            seed: None,
        }
    }

    /// Allows the plan to drop tables and columns.
    #[must_use]
    pub fn allow_deletions(mut self, allow: bool) -> Self {
        self.allow_deletions = allow;
        self
    }

    /// Derives temporary table names from a seeded generator instead of the
    /// thread-local one, making plans reproducible.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Plans the changes that bring the database to `ddl`.
    pub async fn plan(&self, ddl: &str) -> Result<Plan> {
        let token = self.temp_token();

        let desired = EphemeralSchema::load(ddl).await?;
        let result = self.plan_against(&desired.introspector(), token).await;
        desired.close().await;
        result
    }

    fn temp_token(&self) -> u64 {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed).next_u64(),
            None => rand::rng().next_u64(),
        }
    }

    async fn plan_against(&self, desired: &Introspector, token: u64) -> Result<Plan> {
        let actual = Introspector::new(self.pool.clone());

        let wanted = desired.snapshot().await?;
        let existing = actual.snapshot().await?;

        let tables = ObjectDiff::between(&existing.tables, &wanted.tables);
        debug!(
            added = tables.added.len(),
            removed = tables.removed.len(),
            modified = tables.modified.len(),
            "Compared tables"
        );

        if !tables.removed.is_empty() && !self.allow_deletions {
            return Err(ReconcileError::DeletionNotAllowed(Deletion::Tables(
                tables.removed.clone(),
            )));
        }

        let mut plan = Plan::new();

        // Tables, indices and views share one namespace.
        let mut displaced: Vec<(ObjectKind, String)> = Vec::new();
        for name in &tables.added {
            for kind in [ObjectKind::Index, ObjectKind::View] {
                if existing.catalog(kind).contains(name) {
                    plan.push(drop_sql(kind.keyword(), name));
                    displaced.push((kind, name.clone()));
                }
            }
        }

        for name in &tables.added {
            if let Some(sql) = wanted.tables.sql(name) {
                plan.push(sql);
            }
        }

        for name in &tables.removed {
            plan.push(drop_sql(ObjectKind::Table.keyword(), name));
        }

        for name in &tables.modified {
            self.rebuild_table(&mut plan, name, token, &wanted, desired, &actual)
                .await?;
        }

        Self::recreate_dependents(&mut plan, &tables, &displaced, &existing, &wanted);

        debug!(operations = plan.len(), "Planned reconciliation");
        Ok(plan)
    }

    async fn rebuild_table(
        &self,
        plan: &mut Plan,
        table: &str,
        token: u64,
        wanted: &Snapshot,
        desired: &Introspector,
        actual: &Introspector,
    ) -> Result<()> {
        let rebuild = TableRebuild::new(table, token);
        let desired_sql = wanted
            .tables
            .sql(table)
            .ok_or_else(|| ReconcileError::TableDefinition {
                table: table.to_string(),
            })?;
        let create = rebuild.create_sql(desired_sql)?;

        let desired_columns = desired.list_columns(table).await?;
        let actual_columns = actual.list_columns(table).await?;

        let missing = actual_columns.missing_from(&desired_columns);
        if !missing.is_empty() && !self.allow_deletions {
            return Err(ReconcileError::DeletionNotAllowed(Deletion::Columns {
                table: table.to_string(),
                columns: missing,
            }));
        }

        let common = actual_columns.common_with(&desired_columns);
        debug!(
            table = %table,
            temp = %rebuild.temp_name(),
            kept = common.len(),
            dropped = missing.len(),
            "Rebuilding table"
        );

        plan.push(create);
        if !common.is_empty() {
            plan.push(rebuild.copy_sql(&common));
        }
        plan.push(rebuild.drop_sql());
        plan.push(rebuild.rename_sql());
        Ok(())
    }

    fn recreate_dependents(
        plan: &mut Plan,
        tables: &ObjectDiff,
        displaced: &[(ObjectKind, String)],
        existing: &Snapshot,
        wanted: &Snapshot,
    ) {
        let diffs: Vec<(ObjectKind, ObjectDiff)> = DEPENDENT_KINDS
            .iter()
            .map(|&kind| {
                (
                    kind,
                    ObjectDiff::between(existing.catalog(kind), wanted.catalog(kind)),
                )
            })
            .collect();

        // Tables and views whose attached indices and triggers the engine drops.
        let mut gone: BTreeSet<String> = tables
            .removed
            .iter()
            .chain(&tables.modified)
            .cloned()
            .collect();
        for (kind, diff) in &diffs {
            if *kind == ObjectKind::View {
                gone.extend(diff.to_drop());
            }
        }
        let attached_to_gone = |kind: ObjectKind, table: &str| {
            kind != ObjectKind::View && gone.contains(table)
        };

        for (kind, diff) in &diffs {
            let catalog = existing.catalog(*kind);
            for name in diff.to_drop() {
                let implicit = catalog
                    .get(&name)
                    .is_some_and(|object| attached_to_gone(*kind, &object.table));
                let already_dropped = displaced.iter().any(|(k, n)| k == kind && *n == name);
                if !implicit && !already_dropped {
                    plan.push(drop_sql(kind.keyword(), &name));
                }
            }
        }

        for (kind, diff) in &diffs {
            let catalog = wanted.catalog(*kind);
            let mut create: BTreeSet<String> = diff.to_create().into_iter().collect();
            create.extend(
                catalog
                    .iter()
                    .filter(|object| attached_to_gone(*kind, &object.table))
                    .map(|object| object.name.clone()),
            );
            for name in &create {
                if let Some(sql) = catalog.sql(name) {
                    plan.push(sql);
                }
            }
        }
    }
}

/// Plans the changes that bring the database behind `pool` to `ddl`.
pub async fn plan(pool: &SqlitePool, ddl: &str, allow_deletions: bool) -> Result<Plan> {
    Planner::new(pool.clone())
        .allow_deletions(allow_deletions)
        .plan(ddl)
        .await
}
