//! Statement builder that keeps identifiers, SQL text, and values apart.
//!
//! A [`Statement`] can only be assembled from:
//! - static SQL text (`&'static str`, so it is fixed at compile time),
//! - [`Ident`]s, quoted by the [`Dialect`],
//! - [`SqlFragment`]s, typed pieces such as target types and referential actions,
//! - bound values, which become placeholders and travel separately in `params`.

use std::fmt;

use super::identifier::Ident;
use super::traits::Dialect;
use super::value::SqlValue;

/// A typed piece of SQL that renders itself.
///
/// Implemented only for closed, validated types; never for free-form strings.
pub trait SqlFragment {
    /// Append this fragment's SQL text.
    fn write_sql(&self, out: &mut String);
}

/// SQL text plus its bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    /// The SQL text, with placeholders for parameters.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameter values in placeholder order.
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Incremental statement builder for one dialect.
pub struct QueryBuilder<D: Dialect> {
    dialect: D,
    sql: String,
    params: Vec<SqlValue>,
}

impl<D: Dialect> QueryBuilder<D> {
    /// Start an empty statement.
    pub fn new(dialect: D) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Append fixed SQL text.
    pub fn push(&mut self, sql: &'static str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a quoted identifier.
    pub fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        self.sql.push_str(&self.dialect.quote_ident(ident.as_str()));
        self
    }

    /// Append `schema.name`, both quoted.
    pub fn push_qualified(&mut self, schema: &Ident, name: &Ident) -> &mut Self {
        self.push_ident(schema).push(".").push_ident(name)
    }

    /// Append a comma-separated list of quoted identifiers.
    pub fn push_ident_list<'a>(&mut self, idents: impl IntoIterator<Item = &'a Ident>) -> &mut Self {
        for (i, ident) in idents.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_ident(ident);
        }
        self
    }

    /// Append a typed fragment.
    pub fn push_fragment(&mut self, fragment: &dyn SqlFragment) -> &mut Self {
        fragment.write_sql(&mut self.sql);
        self
    }

    /// Append a placeholder and bind `value` to it.
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        let placeholder = self.dialect.param_placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Number of values bound so far.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Finish the statement.
    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}
