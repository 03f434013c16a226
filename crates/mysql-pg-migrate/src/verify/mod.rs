//! Post-migration integrity checks.
//!
//! - Row counts: source and target must agree per table. A mismatch is
//!   fatal and aborts the run.
//! - Orphaned references: target rows whose non-null FK column has no
//!   parent row. These are reported, never fatal.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::traits::query_i64_guarded;
use crate::core::{ForeignKeyDescriptor, Ident, QueryBuilder, SourceReader, Statement, TableDescriptor, TargetSession};
use crate::drivers::postgres::PostgresDialect;
use crate::error::{MigrateError, Result};

const ORPHAN_SAVEPOINT: &str = "mysql_pg_orphan";

/// Source and target row counts of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCountCheck {
    pub source_rows: i64,
    pub target_rows: i64,
}

impl RowCountCheck {
    pub fn matches(&self) -> bool {
        self.source_rows == self.target_rows
    }
}

/// Orphan count for one foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanCheck {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// `None` when the count query itself failed.
    pub orphans: Option<i64>,
}

/// `SELECT COUNT(*) FROM schema.table`.
pub fn target_count_statement(schema: &Ident, table: &Ident) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("SELECT COUNT(*) FROM ").push_qualified(schema, table);
    q.build()
}

/// Count child rows whose FK value has no parent row.
pub fn orphan_count_statement(schema: &Ident, table: &Ident, fk: &ForeignKeyDescriptor) -> Statement {
    let mut q = QueryBuilder::new(PostgresDialect);
    q.push("SELECT COUNT(*) FROM ")
        .push_qualified(schema, table)
        .push(" AS c WHERE c.")
        .push_ident(&fk.column)
        .push(" IS NOT NULL AND NOT EXISTS (SELECT 1 FROM ")
        .push_qualified(schema, &fk.referenced_table)
        .push(" AS p WHERE p.")
        .push_ident(&fk.referenced_column)
        .push(" = c.")
        .push_ident(&fk.column)
        .push(")");
    q.build()
}

/// Runs row count and referential checks against the target.
pub struct IntegrityValidator<'a> {
    source: &'a dyn SourceReader,
    schema: &'a Ident,
}

impl<'a> IntegrityValidator<'a> {
    pub fn new(source: &'a dyn SourceReader, schema: &'a Ident) -> Self {
        Self { source, schema }
    }

    /// Compare row counts; returns [`MigrateError::RowCountMismatch`] when
    /// they differ.
    pub async fn check_row_count(
        &self,
        session: &mut dyn TargetSession,
        table: &TableDescriptor,
    ) -> Result<RowCountCheck> {
        let source_rows = self.source.row_count(&table.source_name).await?;
        let target_rows = session
            .query_i64(&target_count_statement(self.schema, &table.name))
            .await?
            .unwrap_or(0);

        let check = RowCountCheck {
            source_rows,
            target_rows,
        };
        if !check.matches() {
            let err = MigrateError::RowCountMismatch {
                table: table.name.to_string(),
                source_rows,
                target_rows,
            };
            error!("{}", err);
            return Err(err);
        }

        info!("Row count validated for {}: {} rows", table.name, target_rows);
        Ok(check)
    }

    /// Count orphaned references for every foreign key of `table`.
    pub async fn check_orphans(
        &self,
        session: &mut dyn TargetSession,
        table: &TableDescriptor,
    ) -> Result<Vec<OrphanCheck>> {
        let mut checks = Vec::with_capacity(table.foreign_keys.len());

        for fk in &table.foreign_keys {
            let stmt = orphan_count_statement(self.schema, &table.name, fk);
            let orphans = match query_i64_guarded(session, ORPHAN_SAVEPOINT, &stmt).await? {
                Ok(count) => {
                    let count = count.unwrap_or(0);
                    if count > 0 {
                        warn!(
                            "{}",
                            MigrateError::OrphanReferences {
                                table: table.name.to_string(),
                                column: fk.column.to_string(),
                                referenced_table: fk.referenced_table.to_string(),
                                count,
                            }
                        );
                    } else {
                        info!("Foreign key validation passed for {}.{}", table.name, fk.column);
                    }
                    Some(count)
                }
                Err(e) => {
                    warn!(
                        "Could not check {}.{} for orphaned references: {}",
                        table.name, fk.column, e
                    );
                    None
                }
            };

            checks.push(OrphanCheck {
                column: fk.column.to_string(),
                referenced_table: fk.referenced_table.to_string(),
                referenced_column: fk.referenced_column.to_string(),
                orphans,
            });
        }

        Ok(checks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReferentialAction;

    fn ident(name: &str) -> Ident {
        Ident::new(name).unwrap()
    }

    #[test]
    fn test_orphan_query_shape() {
        let fk = ForeignKeyDescriptor {
            constraint_name: "orders_ibfk_1".into(),
            column: ident("customer_id"),
            referenced_table: ident("customers"),
            referenced_column: ident("id"),
            on_update: ReferentialAction::Restrict,
            on_delete: ReferentialAction::Cascade,
        };
        let stmt = orphan_count_statement(&ident("public"), &ident("orders"), &fk);
        assert_eq!(
            stmt.sql(),
            "SELECT COUNT(*) FROM \"public\".\"orders\" AS c WHERE c.\"customer_id\" IS NOT NULL \
             AND NOT EXISTS (SELECT 1 FROM \"public\".\"customers\" AS p WHERE p.\"id\" = c.\"customer_id\")"
        );
        assert!(stmt.params().is_empty());
    }

    #[test]
    fn test_target_count_statement() {
        let stmt = target_count_statement(&ident("legacy"), &ident("Orders"));
        assert_eq!(stmt.sql(), "SELECT COUNT(*) FROM \"legacy\".\"Orders\"");
    }

    #[test]
    fn test_row_count_check_matches() {
        assert!(RowCountCheck { source_rows: 3, target_rows: 3 }.matches());
        assert!(!RowCountCheck { source_rows: 3, target_rows: 2 }.matches());
    }
}
