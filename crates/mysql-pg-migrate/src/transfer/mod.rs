//! Data transfer engine.
//!
//! Moves one table at a time from the source into the already-created
//! target table:
//! - rows are read in fixed-size batches by offset pagination,
//! - each row is sanitized (zero dates to NULL, NUL bytes rejected),
//! - each batch is written as bulk INSERTs inside one savepoint,
//! - a rejected batch is rolled back to its savepoint and replayed row by
//!   row, each row under its own savepoint; rows that still fail are dropped.

pub mod sanitize;

use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::MigrationConfig;
use crate::core::traits::execute_guarded;
use crate::core::{Batch, Ident, QueryBuilder, Row, SourceReader, Statement, TableDescriptor, TargetSession};
use crate::drivers::postgres::PostgresDialect;
use crate::error::{MigrateError, Result};

use sanitize::sanitize_row;

const BATCH_SAVEPOINT: &str = "mysql_pg_batch";
const ROW_SAVEPOINT: &str = "mysql_pg_row";

/// Bind parameters PostgreSQL accepts in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Transfer engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Rows per source read and per bulk write.
    pub batch_size: usize,
}

impl TransferConfig {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self { batch_size: 1000 }
    }
}

/// A source row that never reached the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    /// 1-based position in the table scan.
    pub row: u64,
    pub reason: String,
}

/// Outcome of writing one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub attempted: usize,
    pub inserted: usize,
    pub dropped_rows: Vec<DroppedRow>,
    /// Whether the bulk insert was rejected and rows were replayed one by one.
    pub fell_back: bool,
}

/// Outcome of transferring one table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableTransfer {
    pub rows_read: u64,
    pub rows_inserted: u64,
    pub dropped_rows: Vec<DroppedRow>,
    pub batches: usize,
    pub fallback_batches: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Progress event, sent once per batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub table: String,
    pub rows_done: u64,
    /// Row count known before the transfer started.
    pub rows_total: i64,
}

/// Build the INSERT statements for `rows`.
///
/// Rows are split across statements so no statement exceeds
/// [`MAX_BIND_PARAMS`] bound values.
pub fn insert_statements(schema: &Ident, table: &TableDescriptor, rows: &[Row]) -> Vec<Statement> {
    let width = table.columns.len();
    if width == 0 || rows.is_empty() {
        return Vec::new();
    }
    let rows_per_statement = (MAX_BIND_PARAMS / width).max(1);

    rows.chunks(rows_per_statement)
        .map(|chunk| {
            let mut q = QueryBuilder::new(PostgresDialect);
            q.push("INSERT INTO ")
                .push_qualified(schema, &table.name)
                .push(" (")
                .push_ident_list(table.columns.iter().map(|c| &c.name))
                .push(") VALUES ");
            for (i, row) in chunk.iter().enumerate() {
                if i > 0 {
                    q.push(", ");
                }
                q.push("(");
                for (j, value) in row.iter().enumerate() {
                    if j > 0 {
                        q.push(", ");
                    }
                    q.push_bind(value.clone());
                }
                q.push(")");
            }
            q.build()
        })
        .collect()
}

/// Batched reader/writer for one table at a time.
pub struct DataTransferEngine<'a> {
    source: &'a dyn SourceReader,
    config: TransferConfig,
    progress: Option<UnboundedSender<ProgressUpdate>>,
}

impl<'a> DataTransferEngine<'a> {
    pub fn new(source: &'a dyn SourceReader, config: TransferConfig) -> Self {
        Self {
            source,
            config,
            progress: None,
        }
    }

    /// Send a [`ProgressUpdate`] after every batch.
    pub fn with_progress(mut self, progress: Option<UnboundedSender<ProgressUpdate>>) -> Self {
        self.progress = progress;
        self
    }

    /// Transfer every row of `table`.
    ///
    /// `rows_total` is the source row count taken before the transfer and is
    /// only used for progress reporting.
    pub async fn transfer_table(
        &self,
        session: &mut dyn TargetSession,
        schema: &Ident,
        table: &TableDescriptor,
        rows_total: i64,
    ) -> Result<TableTransfer> {
        info!(
            "Starting transfer for {} ({} rows, batch size {})",
            table.name, rows_total, self.config.batch_size
        );
        let start = Instant::now();
        let mut stats = TableTransfer::default();
        let mut offset: u64 = 0;

        loop {
            let batch = self
                .source
                .read_rows(table, offset, self.config.batch_size)
                .await?;
            if batch.is_empty() {
                break;
            }
            let read = batch.len();

            let result = self.write_batch(session, schema, table, batch).await?;
            stats.rows_read += read as u64;
            stats.rows_inserted += result.inserted as u64;
            stats.batches += 1;
            if result.fell_back {
                stats.fallback_batches += 1;
            }
            stats.dropped_rows.extend(result.dropped_rows);

            debug!(
                "{}: {}/{} rows written",
                table.name, stats.rows_inserted, rows_total
            );
            if let Some(tx) = &self.progress {
                // The receiver may be gone; progress is advisory.
                let _ = tx.send(ProgressUpdate {
                    table: table.name.to_string(),
                    rows_done: stats.rows_read,
                    rows_total,
                });
            }

            offset += read as u64;
            if read < self.config.batch_size {
                break;
            }
        }

        stats.elapsed = start.elapsed();
        if stats.dropped_rows.is_empty() {
            info!(
                "{}: transferred {} rows in {:?}",
                table.name, stats.rows_inserted, stats.elapsed
            );
        } else {
            warn!(
                "{}: transferred {} rows in {:?}, dropped {}",
                table.name,
                stats.rows_inserted,
                stats.elapsed,
                stats.dropped_rows.len()
            );
        }
        Ok(stats)
    }

    /// Sanitize and write one batch, falling back to single rows on failure.
    ///
    /// Only errors managing the transaction itself are returned as `Err`.
    pub async fn write_batch(
        &self,
        session: &mut dyn TargetSession,
        schema: &Ident,
        table: &TableDescriptor,
        batch: Batch,
    ) -> Result<BatchResult> {
        let mut result = BatchResult {
            attempted: batch.len(),
            ..Default::default()
        };

        let mut positions = Vec::with_capacity(batch.len());
        let mut rows = Vec::with_capacity(batch.len());
        for (i, row) in batch.rows.into_iter().enumerate() {
            let position = batch.offset + i as u64 + 1;
            match sanitize_row(row) {
                Ok(clean) => {
                    positions.push(position);
                    rows.push(clean);
                }
                Err(reason) => {
                    let err = MigrateError::RowSanitization {
                        table: table.name.to_string(),
                        row: position,
                        reason,
                    };
                    warn!("{}", err);
                    result.dropped_rows.push(DroppedRow {
                        row: position,
                        reason: err.to_string(),
                    });
                }
            }
        }
        if rows.is_empty() {
            return Ok(result);
        }

        match self.bulk_insert(session, schema, table, &rows).await? {
            Ok(()) => {
                result.inserted = rows.len();
                return Ok(result);
            }
            Err(e) => {
                let err = MigrateError::BatchInsert {
                    table: table.name.to_string(),
                    offset: batch.offset,
                    message: e.to_string(),
                };
                warn!("{}; retrying row by row", err);
                result.fell_back = true;
            }
        }

        for (position, row) in positions.into_iter().zip(rows) {
            let Some(stmt) = insert_statements(schema, table, std::slice::from_ref(&row)).pop() else {
                continue;
            };
            match execute_guarded(session, ROW_SAVEPOINT, &stmt).await? {
                Ok(_) => result.inserted += 1,
                Err(e) => {
                    let err = MigrateError::RowInsert {
                        table: table.name.to_string(),
                        row: position,
                        message: e.to_string(),
                    };
                    warn!("{}", err);
                    result.dropped_rows.push(DroppedRow {
                        row: position,
                        reason: err.to_string(),
                    });
                }
            }
        }

        Ok(result)
    }

    /// All statements of one batch under a single savepoint.
    async fn bulk_insert(
        &self,
        session: &mut dyn TargetSession,
        schema: &Ident,
        table: &TableDescriptor,
        rows: &[Row],
    ) -> Result<std::result::Result<(), MigrateError>> {
        session.savepoint(BATCH_SAVEPOINT).await?;
        for stmt in insert_statements(schema, table, rows) {
            if let Err(e) = session.execute(&stmt).await {
                session.rollback_to_savepoint(BATCH_SAVEPOINT).await?;
                return Ok(Err(e));
            }
        }
        session.release_savepoint(BATCH_SAVEPOINT).await?;
        Ok(Ok(()))
    }
}
