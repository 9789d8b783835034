//! Catalog representation types.
//!
//! A catalog is the set of schema objects of one kind, keyed by name, as read
//! from `sqlite_master`. Catalogs are ordered by name so that everything
//! derived from them is deterministic.

use std::collections::BTreeMap;
use std::fmt;

/// Kinds of schema objects tracked in `sqlite_master`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// A table.
    Table,
    /// An index.
    Index,
    /// A view.
    View,
    /// A trigger.
    Trigger,
}

impl ObjectKind {
    /// The `type` value used for this kind in `sqlite_master`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Index => "index",
            Self::View => "view",
            Self::Trigger => "trigger",
        }
    }

    /// The keyword used in `DROP <keyword>` statements.
    #[must_use]
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::Index => "INDEX",
            Self::View => "VIEW",
            Self::Trigger => "TRIGGER",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named schema object and its defining statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    /// Object name.
    pub name: String,
    /// Table the object belongs to (`tbl_name`). Tables and views name themselves.
    pub table: String,
    /// The creation statement as stored by the engine.
    pub sql: String,
}

impl SchemaObject {
    /// Creates a new schema object.
    pub fn new(name: impl Into<String>, table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            sql: sql.into(),
        }
    }
}

/// All objects of one kind, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    kind: ObjectKind,
    objects: BTreeMap<String, SchemaObject>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            objects: BTreeMap::new(),
        }
    }

    /// Adds an object, replacing any previous object with the same name.
    pub fn insert(&mut self, object: SchemaObject) {
        self.objects.insert(object.name.clone(), object);
    }

    /// The kind of objects held.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Looks up an object by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SchemaObject> {
        self.objects.get(name)
    }

    /// Returns the defining statement of an object.
    #[must_use]
    pub fn sql(&self, name: &str) -> Option<&str> {
        self.objects.get(name).map(|o| o.sql.as_str())
    }

    /// Returns true if an object with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains_key(name)
    }

    /// Object names in lexical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    /// Objects in name order.
    pub fn iter(&self) -> impl Iterator<Item = &SchemaObject> {
        self.objects.values()
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if the catalog holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Extend<SchemaObject> for Catalog {
    fn extend<T: IntoIterator<Item = SchemaObject>>(&mut self, iter: T) {
        for object in iter {
            self.insert(object);
        }
    }
}

/// The four catalogs of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Tables.
    pub tables: Catalog,
    /// Indices.
    pub indices: Catalog,
    /// Views.
    pub views: Catalog,
    /// Triggers.
    pub triggers: Catalog,
}

impl Snapshot {
    /// Returns the catalog holding objects of `kind`.
    #[must_use]
    pub fn catalog(&self, kind: ObjectKind) -> &Catalog {
        match kind {
            ObjectKind::Table => &self.tables,
            ObjectKind::Index => &self.indices,
            ObjectKind::View => &self.views,
            ObjectKind::Trigger => &self.triggers,
        }
    }
}

/// Column metadata as reported by `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Ordinal position.
    pub cid: i64,
    /// Column name.
    pub name: String,
    /// Declared type, empty if none was given.
    pub declared_type: String,
    /// Whether the column is declared NOT NULL.
    pub not_null: bool,
    /// Default value expression text.
    pub default_value: Option<String>,
    /// 1-based position within the primary key, or 0.
    pub primary_key: i64,
}

/// The columns of one table, in ordinal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Columns {
    columns: Vec<ColumnInfo>,
}

impl Columns {
    /// Builds the column list, sorting by ordinal position.
    #[must_use]
    pub fn new(mut columns: Vec<ColumnInfo>) -> Self {
        columns.sort_by_key(|c| c.cid);
        Self { columns }
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if a column with this name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Column names in ordinal order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Returns true if the table has no columns (it does not exist).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Names present here and in `other`, in this list's order.
    #[must_use]
    pub fn common_with(&self, other: &Self) -> Vec<String> {
        self.names()
            .filter(|name| other.contains(name))
            .map(str::to_string)
            .collect()
    }

    /// Names present here but missing from `other`, in this list's order.
    #[must_use]
    pub fn missing_from(&self, other: &Self) -> Vec<String> {
        self.names()
            .filter(|name| !other.contains(name))
            .map(str::to_string)
            .collect()
    }
}
