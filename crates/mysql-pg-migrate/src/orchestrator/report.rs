//! Migration report types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constraints::ConstraintOutcome;
use crate::error::Result;
use crate::sequences::SequenceReset;
use crate::transfer::DroppedRow;
use crate::verify::OrphanCheck;

/// Final state of a run that reached the report stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All passes ran and the transaction committed.
    Completed,
    /// The source had no base tables; the target was not touched.
    NothingToMigrate,
}

/// Per-table outcome.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableReport {
    /// Target table name.
    pub table: String,
    /// Table name as spelled in the source.
    pub source_table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub dropped_rows: Vec<DroppedRow>,
    pub fallback_batches: usize,
    /// Transfer duration in milliseconds.
    pub transfer_ms: u64,
    pub auto_increment_columns: Vec<String>,
    pub sequences_reset: Vec<SequenceReset>,
    pub sequences_failed: Vec<String>,
    pub indexes: ConstraintOutcome,
    pub foreign_keys: ConstraintOutcome,
    pub orphans: Vec<OrphanCheck>,
}

impl TableReport {
    pub fn row_count_matches(&self) -> bool {
        self.source_rows == self.target_rows
    }

    /// Total orphaned references found across the table's foreign keys.
    pub fn orphan_references(&self) -> i64 {
        self.orphans.iter().filter_map(|o| o.orphans).sum()
    }
}

/// Grand totals over all tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub tables: usize,
    pub source_rows: i64,
    pub target_rows: i64,
    pub dropped_rows: usize,
    pub sequences_reset: usize,
    pub constraints_created: usize,
    pub constraints_failed: usize,
    pub orphan_references: i64,
}

impl Totals {
    pub fn from_tables(tables: &[TableReport]) -> Self {
        tables.iter().fold(Totals::default(), |mut t, table| {
            t.tables += 1;
            t.source_rows += table.source_rows;
            t.target_rows += table.target_rows;
            t.dropped_rows += table.dropped_rows.len();
            t.sequences_reset += table.sequences_reset.len();
            t.constraints_created += table.indexes.created + table.foreign_keys.created;
            t.constraints_failed += table.indexes.failed.len() + table.foreign_keys.failed.len();
            t.orphan_references += table.orphan_references();
            t
        })
    }
}

/// Summary of one migration run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub source_database: String,
    pub target_schema: String,
    /// Tables in creation order.
    pub order: Vec<String>,
    /// Tables appended to the order because of a foreign key cycle.
    pub cycle_members: Vec<String>,
    pub tables: Vec<TableReport>,
    pub totals: Totals,
}

impl MigrationReport {
    /// Close the report, stamping the end time and computing totals.
    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.completed_at = Utc::now();
        self.duration_seconds =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        self.totals = Totals::from_tables(&self.tables);
    }

    /// Whether every table's row counts agree.
    pub fn all_match(&self) -> bool {
        self.tables.iter().all(TableReport::row_count_matches)
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
