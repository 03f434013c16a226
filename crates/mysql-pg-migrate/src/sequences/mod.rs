//! Sequence reconciliation after bulk load.
//!
//! Rows are inserted with explicit auto-increment values, so the SERIAL
//! sequences behind those columns still sit at their start value. For each
//! auto-increment column the sequence is advanced past `MAX(column)`.
//!
//! The sequence name is guessed from the usual `{table}_{column}_seq` pattern
//! in every case combination; if none resolves, the target catalog is
//! searched before giving up.

use serde::Serialize;
use tracing::{debug, error, info};

use crate::core::identifier::quote_pg;
use crate::core::traits::query_i64_guarded;
use crate::core::{ColumnDescriptor, Ident, QueryBuilder, Statement, TableDescriptor, TargetSession};
use crate::drivers::postgres::PostgresDialect;
use crate::error::{MigrateError, Result};

const SEQUENCE_SAVEPOINT: &str = "mysql_pg_seq";

/// One advanced sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceReset {
    pub column: String,
    pub sequence: String,
    /// Value the next insert will receive.
    pub next_value: i64,
}

/// Result of reconciling one table's sequences.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SequenceOutcome {
    pub reset: Vec<SequenceReset>,
    /// Columns with no rows to reconcile against.
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Plausible sequence names for an auto-increment column, most likely first.
pub fn candidate_names(table: &TableDescriptor, column: &ColumnDescriptor) -> Vec<String> {
    let tables = [table.name.as_str(), table.source_name.as_str()];
    let columns = [column.name.as_str(), column.source_name.as_str()];
    let ordered = [
        (tables[0], columns[0]),
        (tables[1], columns[1]),
        (tables[0], columns[1]),
        (tables[1], columns[0]),
    ];

    let mut names: Vec<String> = Vec::with_capacity(ordered.len());
    for (t, c) in ordered {
        let name = format!("{}_{}_seq", t, c);
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Escape LIKE wildcards so names match literally.
fn like_literal(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// `SELECT CAST(MAX(col) AS BIGINT) FROM schema.table`.
pub fn max_value_statement(schema: &Ident, table: &TableDescriptor, column: &ColumnDescriptor) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("SELECT CAST(MAX(")
        .push_ident(&column.name)
        .push(") AS BIGINT) FROM ")
        .push_qualified(schema, &table.name);
    q.build()
}

/// `setval` on a schema-qualified sequence name bound as text.
pub fn setval_statement(schema: &Ident, sequence: &str, value: i64) -> Statement {
    let qualified = format!("{}.{}", quote_pg(schema.as_str()), quote_pg(sequence));
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("SELECT setval(CAST(")
        .push_bind(qualified)
        .push(" AS TEXT)::regclass, ")
        .push_bind(value)
        .push(", true)");
    q.build()
}

/// Catalog search for sequences whose name mentions table and column.
pub fn sequence_search_statement(schema: &Ident, table: &TableDescriptor, column: &ColumnDescriptor) -> Statement {
    let pattern = format!(
        "%{}%{}%",
        like_literal(table.name.as_str()),
        like_literal(column.name.as_str())
    );
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("SELECT sequence_name::text FROM information_schema.sequences WHERE sequence_schema::text = ")
        .push_bind(schema.as_str())
        .push("::text AND sequence_name::text ILIKE ")
        .push_bind(pattern)
        .push("::text ORDER BY sequence_name");
    q.build()
}

/// Restores auto-increment counters on the target.
pub struct SequenceReconciler<'a> {
    schema: &'a Ident,
}

impl<'a> SequenceReconciler<'a> {
    pub fn new(schema: &'a Ident) -> Self {
        Self { schema }
    }

    /// Advance the sequence of every auto-increment column of `table`.
    ///
    /// Resolution failures are logged and recorded; only a broken
    /// transaction is returned as `Err`.
    pub async fn reconcile(
        &self,
        session: &mut dyn TargetSession,
        table: &TableDescriptor,
    ) -> Result<SequenceOutcome> {
        let mut outcome = SequenceOutcome::default();

        for column in table.auto_increment_columns() {
            let max_stmt = max_value_statement(self.schema, table, column);
            let max = match query_i64_guarded(session, SEQUENCE_SAVEPOINT, &max_stmt).await? {
                Ok(Some(max)) if max >= 1 => max,
                Ok(_) => {
                    debug!("{}.{}: no rows, sequence left as is", table.name, column.name);
                    outcome.skipped.push(column.name.to_string());
                    continue;
                }
                Err(e) => {
                    error!("Reading MAX({}) of {} failed: {}", column.name, table.name, e);
                    outcome.failed.push(column.name.to_string());
                    continue;
                }
            };

            let mut tried = candidate_names(table, column);
            let mut resolved = self.try_candidates(session, &tried, max).await?;

            if resolved.is_none() {
                let found = self.search_catalog(session, table, column).await?;
                let fresh: Vec<String> = found.into_iter().filter(|n| !tried.contains(n)).collect();
                resolved = self.try_candidates(session, &fresh, max).await?;
                tried.extend(fresh);
            }

            match resolved {
                Some(sequence) => {
                    info!(
                        "Reset sequence {} for {}.{}: next value {}",
                        sequence,
                        table.name,
                        column.name,
                        max + 1
                    );
                    outcome.reset.push(SequenceReset {
                        column: column.name.to_string(),
                        sequence,
                        next_value: max + 1,
                    });
                }
                None => {
                    let err = MigrateError::SequenceResolution {
                        table: table.name.to_string(),
                        column: column.name.to_string(),
                        tried: tried.join(", "),
                    };
                    error!("{}", err);
                    outcome.failed.push(column.name.to_string());
                }
            }
        }

        Ok(outcome)
    }

    async fn try_candidates(
        &self,
        session: &mut dyn TargetSession,
        candidates: &[String],
        max: i64,
    ) -> Result<Option<String>> {
        for name in candidates {
            let stmt = setval_statement(self.schema, name, max);
            match query_i64_guarded(session, SEQUENCE_SAVEPOINT, &stmt).await? {
                Ok(_) => return Ok(Some(name.clone())),
                Err(e) => debug!("Sequence candidate {} rejected: {}", name, e),
            }
        }
        Ok(None)
    }

    async fn search_catalog(
        &self,
        session: &mut dyn TargetSession,
        table: &TableDescriptor,
        column: &ColumnDescriptor,
    ) -> Result<Vec<String>> {
        let stmt = sequence_search_statement(self.schema, table, column);
        session.savepoint(SEQUENCE_SAVEPOINT).await?;
        match session.query_strings(&stmt).await {
            Ok(names) => {
                session.release_savepoint(SEQUENCE_SAVEPOINT).await?;
                Ok(names)
            }
            Err(e) => {
                session.rollback_to_savepoint(SEQUENCE_SAVEPOINT).await?;
                debug!("Sequence catalog search for {}.{} failed: {}", table.name, column.name, e);
                Ok(Vec::new())
            }
        }
    }
}
