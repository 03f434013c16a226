//! Source schema introspection.
//!
//! Turns the raw catalog rows a [`SourceReader`] reports into
//! [`TableDescriptor`]s. This is the only place identifier case policy is
//! applied; descriptors carry the normalized names from here on.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::constraints::group_index_rows;
use crate::core::{
    ColumnDescriptor, ForeignKeyDescriptor, ForeignKeyEdge, IdentifierCase, RawColumn,
    RawForeignKey, RawIndexRow, ReferentialAction, SourceReader, TableDescriptor,
};
use crate::error::{MigrateError, Result};
use crate::translate::{base_type, map_column_type};
use crate::typemap::{TypeCatalog, FALLBACK_TYPE};

/// Reads live source metadata and builds descriptors.
pub struct SchemaIntrospector<'a> {
    source: &'a dyn SourceReader,
    case: IdentifierCase,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(source: &'a dyn SourceReader, case: IdentifierCase) -> Self {
        Self { source, case }
    }

    /// Base tables of the source database, sorted by name.
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.source.list_tables().await
    }

    /// Foreign key edges among the source tables.
    pub async fn dependency_edges(&self) -> Result<Vec<ForeignKeyEdge>> {
        self.source.foreign_key_edges().await
    }

    /// Build the descriptor of one table from fresh catalog reads.
    pub async fn describe(&self, table: &str) -> Result<TableDescriptor> {
        let columns = self.source.describe_columns(table).await?;
        let foreign_keys = self.source.foreign_keys(table).await?;
        let index_rows = self.source.index_rows(table).await?;

        let descriptor = build_descriptor(self.case, table, &columns, &foreign_keys, &index_rows)?;
        debug!(
            "Described {}: {} columns, {} indexes, {} foreign key columns",
            table,
            descriptor.columns.len(),
            descriptor.indexes.len(),
            descriptor.foreign_keys.len()
        );
        Ok(descriptor)
    }
}

fn describe_column(case: IdentifierCase, table: &str, raw: &RawColumn) -> Result<ColumnDescriptor> {
    let base = base_type(&raw.column_type);
    if TypeCatalog::lookup(&base).is_none() {
        warn!(
            "Column {}.{} has unmapped type '{}'; using {}",
            table, raw.name, raw.column_type, FALLBACK_TYPE
        );
    }
    let is_auto_increment = raw.is_auto_increment();

    Ok(ColumnDescriptor {
        name: case.apply(&raw.name)?,
        source_name: raw.name.clone(),
        source_type: raw.column_type.clone(),
        target_type: map_column_type(&raw.column_type, is_auto_increment),
        base_type: base,
        nullable: raw.nullable,
        default_value: raw.default.clone(),
        is_auto_increment,
    })
}

fn describe_foreign_key(case: IdentifierCase, raw: &RawForeignKey) -> Result<ForeignKeyDescriptor> {
    Ok(ForeignKeyDescriptor {
        constraint_name: raw.constraint_name.clone(),
        column: case.apply(&raw.column)?,
        referenced_table: case.apply(&raw.referenced_table)?,
        referenced_column: case.apply(&raw.referenced_column)?,
        on_update: ReferentialAction::parse(raw.update_rule.as_deref()),
        on_delete: ReferentialAction::parse(raw.delete_rule.as_deref()),
    })
}

/// Assemble a table descriptor from raw catalog rows.
///
/// Primary key columns follow column order. Two source columns that
/// normalize to the same target name are rejected.
pub fn build_descriptor(
    case: IdentifierCase,
    table: &str,
    raw_columns: &[RawColumn],
    foreign_keys: &[RawForeignKey],
    index_rows: &[RawIndexRow],
) -> Result<TableDescriptor> {
    let columns = raw_columns
        .iter()
        .map(|raw| describe_column(case, table, raw))
        .collect::<Result<Vec<_>>>()?;

    let mut seen = HashSet::new();
    for col in &columns {
        if !seen.insert(col.name.as_str()) {
            return Err(MigrateError::Identifier(format!(
                "columns of {} collide as '{}' after case normalization",
                table, col.name
            )));
        }
    }

    let primary_key = raw_columns
        .iter()
        .zip(&columns)
        .filter(|(raw, _)| raw.is_primary_key())
        .map(|(_, col)| col.name.clone())
        .collect();

    let foreign_keys = foreign_keys
        .iter()
        .map(|raw| describe_foreign_key(case, raw))
        .collect::<Result<Vec<_>>>()?;

    Ok(TableDescriptor {
        name: case.apply(table)?,
        source_name: table.to_string(),
        columns,
        primary_key,
        indexes: group_index_rows(case, index_rows)?,
        foreign_keys,
    })
}
