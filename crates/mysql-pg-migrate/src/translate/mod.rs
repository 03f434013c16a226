//! Schema translation: column types, defaults, and CREATE TABLE statements.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::warn;

use crate::core::{ColumnDescriptor, Ident, QueryBuilder, SqlFragment, Statement, TableDescriptor, TargetType};
use crate::drivers::postgres::PostgresDialect;
use crate::transfer::sanitize::is_invalid_date;
use crate::typemap::TypeCatalog;

static BASE_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z]+)").expect("valid base type pattern"));

static TYPE_MODIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("valid modifier pattern"));

static SIZE_MODIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(,[0-9]+)?$").expect("valid size pattern"));

static CURRENT_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(current_timestamp(\([0-9]*\))?|now\(\))$").expect("valid timestamp pattern")
});

static NUMERIC_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?$")
        .expect("valid numeric pattern")
});

/// Base types whose defaults are always string literals.
const STRING_FAMILIES: &[&str] = &[
    "char", "varchar", "text", "tinytext", "mediumtext", "longtext", "enum", "set",
];

/// Extract the leading alphabetic token of a source type string, lowercased.
///
/// `varchar(255)` gives `varchar`, `int unsigned` gives `int`.
pub fn base_type(source_type: &str) -> String {
    BASE_TYPE
        .captures(source_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

/// Extract and validate the parenthesized size of a source type.
///
/// Only plain `(n)` and `(p,s)` forms are accepted; anything else is dropped.
pub fn type_modifier(source_type: &str) -> Option<String> {
    let raw = TYPE_MODIFIER.captures(source_type)?.get(1)?.as_str();
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if SIZE_MODIFIER.is_match(&compact) {
        Some(compact)
    } else {
        warn!("Ignoring malformed type modifier '({})' in '{}'", raw, source_type);
        None
    }
}

/// Map a full source type string to a target type.
pub fn map_column_type(source_type: &str, auto_increment: bool) -> TargetType {
    let base = base_type(source_type);
    let name = TypeCatalog::map(&base);

    if auto_increment {
        let serial = match name {
            "INTEGER" => Some("SERIAL"),
            "BIGINT" => Some("BIGSERIAL"),
            "SMALLINT" => Some("SMALLSERIAL"),
            _ => None,
        };
        if let Some(serial) = serial {
            return TargetType::plain(serial);
        }
    }

    let modifier = if TypeCatalog::is_sized(&base) {
        type_modifier(source_type)
    } else {
        None
    };

    TargetType { name, modifier }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
enum DefaultKind {
    CurrentTimestamp,
    Boolean(bool),
    Numeric(String),
    Text(String),
}

/// A column DEFAULT clause value.
///
/// DDL cannot take bind parameters, so defaults are the one place a literal
/// is rendered into SQL. Construction is restricted to validated forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefault(DefaultKind);

impl ColumnDefault {
    /// `CURRENT_TIMESTAMP`.
    pub fn current_timestamp() -> Self {
        Self(DefaultKind::CurrentTimestamp)
    }

    /// `TRUE` or `FALSE`.
    pub fn boolean(value: bool) -> Self {
        Self(DefaultKind::Boolean(value))
    }

    /// A finite, plain numeric literal; `None` for anything else.
    pub fn numeric(literal: &str) -> Option<Self> {
        let literal = literal.trim();
        let finite = literal.parse::<f64>().map(f64::is_finite).unwrap_or(false);
        if finite && NUMERIC_LITERAL.is_match(literal) {
            Some(Self(DefaultKind::Numeric(literal.to_string())))
        } else {
            None
        }
    }

    /// A string literal.
    pub fn text(value: impl Into<String>) -> Self {
        Self(DefaultKind::Text(value.into()))
    }
}

impl SqlFragment for ColumnDefault {
    fn write_sql(&self, out: &mut String) {
        match &self.0 {
            DefaultKind::CurrentTimestamp => out.push_str("CURRENT_TIMESTAMP"),
            DefaultKind::Boolean(true) => out.push_str("TRUE"),
            DefaultKind::Boolean(false) => out.push_str("FALSE"),
            DefaultKind::Numeric(n) => out.push_str(n),
            DefaultKind::Text(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
        }
    }
}

/// Translate a column's source default.
pub fn column_default(column: &ColumnDescriptor) -> Option<ColumnDefault> {
    if column.is_auto_increment {
        return None;
    }
    let raw = column.default_value.as_deref()?;

    if CURRENT_TIMESTAMP.is_match(raw.trim()) {
        return Some(ColumnDefault::current_timestamp());
    }

    if TypeCatalog::is_temporal(&column.base_type) && is_invalid_date(raw) {
        warn!(
            "Dropping default '{}' on column {}: not a valid date",
            raw, column.source_name
        );
        return None;
    }

    if STRING_FAMILIES.contains(&column.base_type.as_str()) {
        return Some(ColumnDefault::text(raw));
    }

    if column.target_type.name == "BOOLEAN" {
        match raw.trim().to_lowercase().as_str() {
            "1" | "b'1'" | "true" => return Some(ColumnDefault::boolean(true)),
            "0" | "b'0'" | "false" => return Some(ColumnDefault::boolean(false)),
            _ => {}
        }
    }

    ColumnDefault::numeric(raw).or_else(|| Some(ColumnDefault::text(raw)))
}

/// One translated column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDefinition {
    pub name: Ident,
    pub target_type: TargetType,
    pub not_null: bool,
    pub default: Option<ColumnDefault>,
}

/// Target-side definition of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDefinition {
    pub table: Ident,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<Ident>,
    /// Target column name to source spelling, for diagnostics only.
    pub case_map: BTreeMap<String, String>,
}

/// Translate a table descriptor into its target definition.
pub fn translate_table(table: &TableDescriptor) -> TableDefinition {
    let columns = table
        .columns
        .iter()
        .map(|c| ColumnDefinition {
            name: c.name.clone(),
            target_type: c.target_type.clone(),
            not_null: !c.nullable,
            default: column_default(c),
        })
        .collect();

    let case_map = table
        .columns
        .iter()
        .map(|c| (c.name.to_string(), c.source_name.clone()))
        .collect();

    TableDefinition {
        table: table.name.clone(),
        columns,
        primary_key: table.primary_key.clone(),
        case_map,
    }
}

/// `CREATE SCHEMA IF NOT EXISTS schema`.
pub fn create_schema_statement(schema: &Ident) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("CREATE SCHEMA IF NOT EXISTS ").push_ident(schema);
    q.build()
}

/// `DROP TABLE IF EXISTS schema.table CASCADE`.
pub fn drop_table_statement(schema: &Ident, table: &Ident) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("DROP TABLE IF EXISTS ")
        .push_qualified(schema, table)
        .push(" CASCADE");
    q.build()
}

/// CREATE TABLE with column definitions and an inline primary key.
pub fn create_table_statement(schema: &Ident, def: &TableDefinition) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("CREATE TABLE ").push_qualified(schema, &def.table).push(" (\n");

    for (i, col) in def.columns.iter().enumerate() {
        if i > 0 {
            q.push(",\n");
        }
        q.push("    ")
            .push_ident(&col.name)
            .push(" ")
            .push_fragment(&col.target_type);
        if col.not_null {
            q.push(" NOT NULL");
        }
        if let Some(default) = &col.default {
            q.push(" DEFAULT ").push_fragment(default);
        }
    }

    if !def.primary_key.is_empty() {
        q.push(",\n    PRIMARY KEY (")
            .push_ident_list(&def.primary_key)
            .push(")");
    }

    q.push("\n)");
    q.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    fn make_column(name: &str, source_type: &str, default: Option<&str>, auto: bool) -> ColumnDescriptor {
        ColumnDescriptor {
            name: ident(&name.to_lowercase()),
            source_name: name.to_string(),
            source_type: source_type.to_string(),
            base_type: base_type(source_type),
            target_type: map_column_type(source_type, auto),
            nullable: !auto,
            default_value: default.map(str::to_string),
            is_auto_increment: auto,
        }
    }

    fn render(default: &ColumnDefault) -> String {
        let mut out = String::new();
        default.write_sql(&mut out);
        out
    }

    #[test]
    fn test_base_type_extraction() {
        assert_eq!(base_type("varchar(255)"), "varchar");
        assert_eq!(base_type("int unsigned"), "int");
        assert_eq!(base_type("DECIMAL(10,2)"), "decimal");
        assert_eq!(base_type("  enum('a','b')"), "enum");
        assert_eq!(base_type("(weird)"), "");
    }

    #[test]
    fn test_sized_types_keep_modifier() {
        assert_eq!(map_column_type("varchar(255)", false).to_string(), "VARCHAR(255)");
        assert_eq!(map_column_type("char(2)", false).to_string(), "CHAR(2)");
        assert_eq!(map_column_type("decimal(10, 2)", false).to_string(), "NUMERIC(10,2)");
    }

    #[test]
    fn test_unsized_types_drop_modifier() {
        assert_eq!(map_column_type("int(11)", false).to_string(), "INTEGER");
        assert_eq!(map_column_type("tinyint(1)", false).to_string(), "SMALLINT");
        assert_eq!(map_column_type("enum('a','b')", false).to_string(), "TEXT");
    }

    #[test]
    fn test_malformed_modifier_dropped() {
        assert_eq!(map_column_type("varchar(255); DROP", false).to_string(), "VARCHAR(255)");
        assert_eq!(map_column_type("varchar(x)", false).to_string(), "VARCHAR");
    }

    #[test]
    fn test_auto_increment_becomes_serial() {
        assert_eq!(map_column_type("int", true).to_string(), "SERIAL");
        assert_eq!(map_column_type("bigint unsigned", true).to_string(), "BIGSERIAL");
        assert_eq!(map_column_type("smallint", true).to_string(), "SMALLSERIAL");
        // Not an integer family: left alone.
        assert_eq!(map_column_type("varchar(10)", true).to_string(), "VARCHAR(10)");
    }

    #[test]
    fn test_unknown_type_maps_to_text() {
        assert_eq!(map_column_type("hyperloglog", false).to_string(), "TEXT");
    }

    #[test]
    fn test_current_timestamp_default() {
        for raw in ["CURRENT_TIMESTAMP", "current_timestamp()", "CURRENT_TIMESTAMP(3)", "now()"] {
            let col = make_column("created_at", "datetime", Some(raw), false);
            assert_eq!(column_default(&col), Some(ColumnDefault::current_timestamp()));
        }
    }

    #[test]
    fn test_string_default_quote_doubled() {
        let col = make_column("note", "varchar(50)", Some("it's"), false);
        let default = column_default(&col).unwrap();
        assert_eq!(render(&default), "'it''s'");
    }

    #[test]
    fn test_hostile_string_default_stays_literal() {
        let col = make_column("note", "text", Some("x'); DROP TABLE t; --"), false);
        assert_eq!(
            render(&column_default(&col).unwrap()),
            "'x''); DROP TABLE t; --'"
        );
    }

    #[test]
    fn test_enum_default_is_quoted() {
        let col = make_column("status", "enum('new','done')", Some("new"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "'new'");
    }

    #[test]
    fn test_numeric_defaults() {
        let col = make_column("qty", "int", Some("0"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "0");

        let col = make_column("price", "decimal(10,2)", Some("9.99"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "9.99");

        let col = make_column("ratio", "double", Some("1e-3"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "1e-3");
    }

    #[test]
    fn test_non_numeric_default_on_numeric_column_is_quoted() {
        let col = make_column("qty", "int", Some("inf"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "'inf'");

        let col = make_column("qty", "int", Some("1; DROP"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "'1; DROP'");
    }

    #[test]
    fn test_boolean_defaults() {
        let col = make_column("active", "bit(1)", Some("b'1'"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "TRUE");

        let col = make_column("active", "bit(1)", Some("0"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "FALSE");
    }

    #[test]
    fn test_zero_date_default_dropped() {
        let col = make_column("shipped_at", "datetime", Some("0000-00-00 00:00:00"), false);
        assert_eq!(column_default(&col), None);

        let col = make_column("due", "date", Some("2024-01-15"), false);
        assert_eq!(render(&column_default(&col).unwrap()), "'2024-01-15'");
    }

    #[test]
    fn test_auto_increment_never_gets_default() {
        let col = make_column("id", "int", Some("0"), true);
        assert_eq!(column_default(&col), None);
    }

    #[test]
    fn test_create_table_statement() {
        let table = TableDescriptor {
            name: ident("orders"),
            source_name: "Orders".into(),
            columns: vec![
                make_column("Id", "int", None, true),
                make_column("Customer_Id", "int", None, false),
                make_column("Created_At", "datetime", Some("CURRENT_TIMESTAMP"), false),
            ],
            primary_key: vec![ident("id")],
            indexes: vec![],
            foreign_keys: vec![],
        };

        let def = translate_table(&table);
        assert_eq!(def.case_map.get("customer_id").map(String::as_str), Some("Customer_Id"));

        let stmt = create_table_statement(&ident("public"), &def);
        assert_eq!(
            stmt.sql(),
            "CREATE TABLE \"public\".\"orders\" (\n    \"id\" SERIAL NOT NULL,\n    \"customer_id\" INTEGER,\n    \"created_at\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n    PRIMARY KEY (\"id\")\n)"
        );
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_drop_table_statement() {
        let stmt = drop_table_statement(&ident("public"), &ident("orders"));
        assert_eq!(stmt.sql(), "DROP TABLE IF EXISTS \"public\".\"orders\" CASCADE");
    }
}
