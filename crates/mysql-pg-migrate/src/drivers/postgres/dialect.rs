//! PostgreSQL SQL dialect.

use crate::core::identifier::quote_pg;
use crate::core::traits::Dialect;

/// PostgreSQL dialect: double-quote quoting and `$n` placeholders.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_pg(name)
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }
}
