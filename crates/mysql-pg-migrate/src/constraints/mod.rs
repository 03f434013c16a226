//! Index, unique constraint, and foreign key creation.
//!
//! Every statement runs in its own savepoint. A rejected statement is logged
//! and recorded, and the remaining constraints are still attempted.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::traits::execute_guarded;
use crate::core::{
    ForeignKeyDescriptor, Ident, IdentifierCase, IndexDescriptor, QueryBuilder, RawIndexRow,
    Statement, TableDescriptor, TargetSession,
};
use crate::drivers::postgres::PostgresDialect;
use crate::error::{MigrateError, Result};

const CONSTRAINT_SAVEPOINT: &str = "mysql_pg_constraint";

/// Name of the primary key pseudo-index in the source catalog.
const PRIMARY_INDEX: &str = "PRIMARY";

/// Group per-column index rows into index descriptors.
///
/// Groups keep the order in which they first appear, and columns keep their
/// key order. The primary key pseudo-index is excluded.
pub fn group_index_rows(case: IdentifierCase, rows: &[RawIndexRow]) -> Result<Vec<IndexDescriptor>> {
    let mut indexes: Vec<IndexDescriptor> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for row in rows {
        if row.index_name.eq_ignore_ascii_case(PRIMARY_INDEX) {
            continue;
        }

        let Some(column) = &row.column else {
            warn!(
                "Index {} has an expression key part; only plain columns are migrated",
                row.index_name
            );
            continue;
        };

        let pos = match positions.get(row.index_name.as_str()) {
            Some(&pos) => pos,
            None => {
                indexes.push(IndexDescriptor {
                    name: case.apply(&row.index_name)?,
                    source_name: row.index_name.clone(),
                    columns: Vec::new(),
                    unique: !row.non_unique,
                    index_type: row.index_type.to_uppercase(),
                });
                positions.insert(row.index_name.as_str(), indexes.len() - 1);
                indexes.len() - 1
            }
        };
        indexes[pos].columns.push(case.apply(column)?);
    }

    indexes.retain(|idx| {
        if idx.columns.is_empty() {
            warn!("Skipping index {}: no plain columns", idx.source_name);
        }
        !idx.columns.is_empty()
    });

    Ok(indexes)
}

/// What a constraint statement creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    Index,
    ForeignKey,
}

/// One constraint DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintStatement {
    pub kind: ConstraintKind,
    pub name: Ident,
    pub statement: Statement,
}

/// Result of creating one group of constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConstraintOutcome {
    pub created: usize,
    pub failed: Vec<String>,
}

impl ConstraintOutcome {
    fn record_failure(&mut self, err: MigrateError) {
        warn!("{}", err);
        self.failed.push(err.to_string());
    }
}

fn derived_name(prefix: &str, table: &Ident, object: &Ident) -> Result<Ident> {
    Ident::new(format!("{}_{}_{}", prefix, table, object))
}

/// Build the statement for one index: `UNIQUE` constraint or plain index.
pub fn index_statement(
    schema: &Ident,
    table: &TableDescriptor,
    index: &IndexDescriptor,
) -> Result<ConstraintStatement> {
    let mut q = QueryBuilder::new(PostgresDialect);

    if index.unique {
        let name = derived_name("uk", &table.name, &index.name)?;
        q.push("ALTER TABLE ")
            .push_qualified(schema, &table.name)
            .push(" ADD CONSTRAINT ")
            .push_ident(&name)
            .push(" UNIQUE (")
            .push_ident_list(&index.columns)
            .push(")");
        Ok(ConstraintStatement {
            kind: ConstraintKind::Unique,
            name,
            statement: q.build(),
        })
    } else {
        let name = derived_name("idx", &table.name, &index.name)?;
        q.push("CREATE INDEX ")
            .push_ident(&name)
            .push(" ON ")
            .push_qualified(schema, &table.name)
            .push(" (")
            .push_ident_list(&index.columns)
            .push(")");
        Ok(ConstraintStatement {
            kind: ConstraintKind::Index,
            name,
            statement: q.build(),
        })
    }
}

/// Build the deferred foreign key statement for one referencing column.
pub fn foreign_key_statement(
    schema: &Ident,
    table: &TableDescriptor,
    fk: &ForeignKeyDescriptor,
) -> Result<ConstraintStatement> {
    let name = derived_name("fk", &table.name, &fk.column)?;
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("ALTER TABLE ")
        .push_qualified(schema, &table.name)
        .push(" ADD CONSTRAINT ")
        .push_ident(&name)
        .push(" FOREIGN KEY (")
        .push_ident(&fk.column)
        .push(") REFERENCES ")
        .push_qualified(schema, &fk.referenced_table)
        .push(" (")
        .push_ident(&fk.referenced_column)
        .push(") ON UPDATE ")
        .push_fragment(&fk.on_update)
        .push(" ON DELETE ")
        .push_fragment(&fk.on_delete)
        .push(" DEFERRABLE INITIALLY DEFERRED");
    Ok(ConstraintStatement {
        kind: ConstraintKind::ForeignKey,
        name,
        statement: q.build(),
    })
}

async fn apply(
    session: &mut dyn TargetSession,
    table: &TableDescriptor,
    built: Result<ConstraintStatement>,
    label: &str,
    outcome: &mut ConstraintOutcome,
) -> Result<()> {
    let constraint = match built {
        Ok(c) => c,
        Err(e) => {
            outcome.record_failure(MigrateError::Constraint {
                table: table.name.to_string(),
                name: label.to_string(),
                message: e.to_string(),
            });
            return Ok(());
        }
    };

    match execute_guarded(session, CONSTRAINT_SAVEPOINT, &constraint.statement).await? {
        Ok(_) => {
            debug!("Created {:?} {}", constraint.kind, constraint.name);
            outcome.created += 1;
        }
        Err(e) => outcome.record_failure(MigrateError::Constraint {
            table: table.name.to_string(),
            name: constraint.name.to_string(),
            message: e.to_string(),
        }),
    }
    Ok(())
}

/// Create every secondary index and unique constraint of a table.
pub async fn create_indexes(
    session: &mut dyn TargetSession,
    schema: &Ident,
    table: &TableDescriptor,
) -> Result<ConstraintOutcome> {
    let mut outcome = ConstraintOutcome::default();

    for index in &table.indexes {
        if matches!(index.index_type.as_str(), "FULLTEXT" | "SPATIAL") {
            info!(
                "Index {}.{} is {} in the source; creating a plain index instead",
                table.name, index.name, index.index_type
            );
        }
        let built = index_statement(schema, table, index);
        apply(session, table, built, index.source_name.as_str(), &mut outcome).await?;
    }

    Ok(outcome)
}

/// Add every foreign key of a table.
pub async fn create_foreign_keys(
    session: &mut dyn TargetSession,
    schema: &Ident,
    table: &TableDescriptor,
) -> Result<ConstraintOutcome> {
    let mut outcome = ConstraintOutcome::default();

    for fk in &table.foreign_keys {
        let built = foreign_key_statement(schema, table, fk);
        apply(session, table, built, fk.constraint_name.as_str(), &mut outcome).await?;
    }

    Ok(outcome)
}
