//! Core traits for the migration engine.
//!
//! - [`SourceReader`]: Reads catalog metadata and rows from the source database
//! - [`TargetSession`]: One transactional session on the target database
//! - [`Dialect`]: SQL syntax strategy (identifier quoting, placeholders)
//!
//! The orchestrator and every pass are written against these traits, so the
//! whole pipeline can be exercised with in-memory implementations.

use async_trait::async_trait;

use crate::error::Result;

use super::query::Statement;
use super::schema::{ForeignKeyEdge, RawColumn, RawForeignKey, RawIndexRow, TableDescriptor};
use super::value::Batch;

/// Read metadata and data from the source database.
///
/// Table arguments are source names, spelled exactly as the catalog lists them.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// List base tables (views excluded), sorted by name.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// List every foreign key edge between tables of the source schema.
    async fn foreign_key_edges(&self) -> Result<Vec<ForeignKeyEdge>>;

    /// Describe the columns of a table in ordinal order.
    async fn describe_columns(&self, table: &str) -> Result<Vec<RawColumn>>;

    /// List foreign key rows of a table, one per referencing column.
    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>>;

    /// List index rows of a table ordered by index name then key position.
    async fn index_rows(&self, table: &str) -> Result<Vec<RawIndexRow>>;

    /// Count rows in a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Read up to `limit` rows starting at `offset`.
    ///
    /// Values come back in `table.columns` order.
    async fn read_rows(&self, table: &TableDescriptor, offset: u64, limit: usize) -> Result<Batch>;

    /// Round-trip a trivial query.
    async fn ping(&self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Release all connections.
    async fn close(&self);
}

/// A single connection to the target database holding one open transaction.
///
/// Savepoint names are fixed identifiers chosen by the caller.
#[async_trait]
pub trait TargetSession: Send {
    /// Open the transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll the whole transaction back.
    async fn rollback(&mut self) -> Result<()>;

    /// Mark a savepoint.
    async fn savepoint(&mut self, name: &'static str) -> Result<()>;

    /// Forget a savepoint, keeping its work.
    async fn release_savepoint(&mut self, name: &'static str) -> Result<()>;

    /// Undo everything since a savepoint.
    async fn rollback_to_savepoint(&mut self, name: &'static str) -> Result<()>;

    /// Execute a statement, returning the affected row count.
    async fn execute(&mut self, stmt: &Statement) -> Result<u64>;

    /// First column of the first row as an integer, if any.
    async fn query_i64(&mut self, stmt: &Statement) -> Result<Option<i64>>;

    /// First column of every row as text.
    async fn query_strings(&mut self, stmt: &Statement) -> Result<Vec<String>>;

    /// Round-trip a trivial query.
    async fn ping(&mut self) -> Result<()>;

    /// Get the database type identifier.
    fn db_type(&self) -> &str;

    /// Release the connection.
    async fn close(&mut self);
}

/// SQL dialect abstraction.
///
/// Different implementations provide interchangeable syntax rules.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    ///
    /// - MySQL: `` `identifier` ``
    /// - PostgreSQL: `"identifier"`
    fn quote_ident(&self, name: &str) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    ///
    /// - MySQL: `?`
    /// - PostgreSQL: `$1`, `$2`, etc.
    fn param_placeholder(&self, index: usize) -> String;
}

/// Run `stmt` inside a savepoint, undoing only its effects on failure.
///
/// A statement error is returned as `Ok(Err(_))` and leaves the transaction
/// usable. An error while managing the savepoint itself means the session is
/// no longer trustworthy and is returned as the outer `Err`.
pub async fn execute_guarded(
    session: &mut dyn TargetSession,
    savepoint: &'static str,
    stmt: &Statement,
) -> Result<std::result::Result<u64, crate::error::MigrateError>> {
    session.savepoint(savepoint).await?;
    match session.execute(stmt).await {
        Ok(n) => {
            session.release_savepoint(savepoint).await?;
            Ok(Ok(n))
        }
        Err(e) => {
            session.rollback_to_savepoint(savepoint).await?;
            Ok(Err(e))
        }
    }
}

/// Like [`execute_guarded`] for a single-value query.
pub async fn query_i64_guarded(
    session: &mut dyn TargetSession,
    savepoint: &'static str,
    stmt: &Statement,
) -> Result<std::result::Result<Option<i64>, crate::error::MigrateError>> {
    session.savepoint(savepoint).await?;
    match session.query_i64(stmt).await {
        Ok(v) => {
            session.release_savepoint(savepoint).await?;
            Ok(Ok(v))
        }
        Err(e) => {
            session.rollback_to_savepoint(savepoint).await?;
            Ok(Err(e))
        }
    }
}
