//! Schema and metadata types for tables, columns, indexes, and foreign keys.
//!
//! Two layers live here. The `Raw*` types mirror what the source catalog
//! reports, with names exactly as MySQL spells them. The `*Descriptor` types
//! are built once per run by the introspector; their identifiers are already
//! case-normalized and validated, and everything downstream consumes them as
//! plain data.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::identifier::Ident;
use super::query::SqlFragment;

/// One row of the source column listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawColumn {
    /// Column name as spelled in the source.
    pub name: String,
    /// Full type string, e.g. `varchar(255)` or `int unsigned`.
    pub column_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Key flag (`PRI`, `UNI`, `MUL` or empty).
    pub key: String,
    /// Default expression or literal.
    pub default: Option<String>,
    /// Extra attributes (`auto_increment`, `DEFAULT_GENERATED`, ...).
    pub extra: String,
}

impl RawColumn {
    /// Whether the column is backed by an auto-increment counter.
    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_lowercase().contains("auto_increment")
    }

    /// Whether the column is part of the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.key.eq_ignore_ascii_case("PRI")
    }
}

/// One column of one foreign key, as listed by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawForeignKey {
    /// Source constraint name.
    pub constraint_name: String,
    /// Referencing column.
    pub column: String,
    /// Referenced table.
    pub referenced_table: String,
    /// Referenced column.
    pub referenced_column: String,
    /// ON UPDATE rule, if reported.
    pub update_rule: Option<String>,
    /// ON DELETE rule, if reported.
    pub delete_rule: Option<String>,
}

/// One column of one index, as listed by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawIndexRow {
    /// Index name (`PRIMARY` for the primary key).
    pub index_name: String,
    /// Column name; absent for functional key parts.
    pub column: Option<String>,
    /// Whether the index allows duplicates.
    pub non_unique: bool,
    /// Storage type (`BTREE`, `HASH`, `FULLTEXT`, `SPATIAL`).
    pub index_type: String,
}

/// A child-to-parent reference used for dependency ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    pub child_table: String,
    pub child_column: String,
    pub parent_table: String,
    pub parent_column: String,
}

/// A PostgreSQL column type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetType {
    /// Type name, e.g. `VARCHAR` or `SERIAL`.
    pub name: &'static str,
    /// Size or precision, e.g. `255` or `10,2`.
    pub modifier: Option<String>,
}

impl TargetType {
    /// A type without a modifier.
    pub fn plain(name: &'static str) -> Self {
        Self {
            name,
            modifier: None,
        }
    }

    /// Whether this type creates its own backing sequence.
    pub fn is_serial(&self) -> bool {
        matches!(self.name, "SMALLSERIAL" | "SERIAL" | "BIGSERIAL")
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.modifier {
            Some(m) => write!(f, "{}({})", self.name, m),
            None => f.write_str(self.name),
        }
    }
}

impl SqlFragment for TargetType {
    fn write_sql(&self, out: &mut String) {
        out.push_str(&self.to_string());
    }
}

/// Foreign key ON UPDATE / ON DELETE action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferentialAction {
    #[default]
    Restrict,
    Cascade,
    SetNull,
    NoAction,
    SetDefault,
}

impl ReferentialAction {
    /// Parse a catalog rule; anything unrecognized falls back to RESTRICT.
    pub fn parse(rule: Option<&str>) -> Self {
        let Some(rule) = rule else {
            return ReferentialAction::Restrict;
        };
        match rule.trim().to_uppercase().as_str() {
            "CASCADE" => ReferentialAction::Cascade,
            "SET NULL" => ReferentialAction::SetNull,
            "NO ACTION" => ReferentialAction::NoAction,
            "SET DEFAULT" => ReferentialAction::SetDefault,
            _ => ReferentialAction::Restrict,
        }
    }

    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

impl SqlFragment for ReferentialAction {
    fn write_sql(&self, out: &mut String) {
        out.push_str(self.as_sql());
    }
}

/// Column metadata after normalization and type mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescriptor {
    /// Target column name.
    pub name: Ident,
    /// Column name as spelled in the source.
    pub source_name: String,
    /// Full source type string.
    pub source_type: String,
    /// Leading alphabetic token of the source type, lowercased.
    pub base_type: String,
    /// Mapped PostgreSQL type.
    pub target_type: TargetType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Raw source default.
    pub default_value: Option<String>,
    /// Whether the column is auto-increment.
    pub is_auto_increment: bool,
}

/// Index metadata grouped from per-column rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDescriptor {
    /// Target index name.
    pub name: Ident,
    /// Index name as spelled in the source.
    pub source_name: String,
    /// Key columns in index order.
    pub columns: Vec<Ident>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Source storage type.
    pub index_type: String,
}

/// Single-column foreign key reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKeyDescriptor {
    /// Source constraint name, kept for diagnostics.
    pub constraint_name: String,
    /// Referencing column.
    pub column: Ident,
    /// Referenced table.
    pub referenced_table: Ident,
    /// Referenced column.
    pub referenced_column: Ident,
    pub on_update: ReferentialAction,
    pub on_delete: ReferentialAction,
}

/// Everything needed to create, fill, and constrain one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    /// Target table name.
    pub name: Ident,
    /// Table name as spelled in the source.
    pub source_name: String,
    /// Columns in ordinal order.
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key columns.
    pub primary_key: Vec<Ident>,
    /// Secondary indexes (the primary key pseudo-index excluded).
    pub indexes: Vec<IndexDescriptor>,
    /// Foreign keys, one entry per referencing column.
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    /// Columns backed by an auto-increment counter.
    pub fn auto_increment_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.is_auto_increment)
    }

    /// Look up a column by its target name.
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }
}
