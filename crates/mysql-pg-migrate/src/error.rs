//! Error types for the migration library.

use thiserror::Error;

/// Exit code for configuration and credential validation errors.
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code when a database cannot be reached or authenticated.
pub const EXIT_CONNECTION_ERROR: u8 = 2;
/// Exit code for unexpected runtime errors during the migration.
pub const EXIT_RUNTIME_ERROR: u8 = 3;
/// Exit code when source and target row counts diverge.
pub const EXIT_ROW_COUNT_MISMATCH: u8 = 4;
/// Exit code when the run was interrupted.
pub const EXIT_CANCELLED: u8 = 5;
/// Exit code for file system errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// Main error type for migration operations.
///
/// Fatal kinds unwind to the orchestrator and abort the run. Non-fatal kinds
/// (see [`MigrateError::is_fatal`]) are constructed at their point of
/// occurrence, logged, recorded on the report, and never propagated.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, unknown option values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing or malformed credential field
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database unreachable or unauthorized
    #[error("Connection to {endpoint} failed: {message}")]
    Connection { endpoint: String, message: String },

    /// Source database query error
    #[error("Source database error while {context}: {source}")]
    Source {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// Target database error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Identifier rejected before it reached any SQL text
    #[error("Invalid identifier: {0}")]
    Identifier(String),

    /// A value could not be coerced into something the target accepts
    #[error("Row {row} of {table} dropped during sanitization: {reason}")]
    RowSanitization {
        table: String,
        row: u64,
        reason: String,
    },

    /// Bulk insert rejected; the batch falls back to row-by-row inserts
    #[error("Batch insert into {table} at offset {offset} failed: {message}")]
    BatchInsert {
        table: String,
        offset: u64,
        message: String,
    },

    /// Single row rejected even after fallback
    #[error("Row {row} of {table} dropped: {message}")]
    RowInsert {
        table: String,
        row: u64,
        message: String,
    },

    /// Index, unique constraint, or foreign key could not be created
    #[error("Constraint {name} on {table} not created: {message}")]
    Constraint {
        table: String,
        name: String,
        message: String,
    },

    /// No sequence could be found for an auto-increment column
    #[error("No sequence found for {table}.{column} (tried: {tried})")]
    SequenceResolution {
        table: String,
        column: String,
        tried: String,
    },

    /// Source and target row counts differ after transfer
    #[error("Row count mismatch for {table}: source has {source_rows}, target has {target_rows}")]
    RowCountMismatch {
        table: String,
        source_rows: i64,
        target_rows: i64,
    },

    /// Target rows reference parent rows that do not exist
    #[error("{count} orphaned rows in {table}.{column} referencing {referenced_table}")]
    OrphanReferences {
        table: String,
        column: String,
        referenced_table: String,
        count: i64,
    },

    /// A retried operation failed on every attempt
    #[error("{operation} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        last: Box<MigrateError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Connection error for the given endpoint.
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// Wrap a sqlx error with a description of what was being attempted.
    pub fn source_query(source: sqlx::Error, context: impl Into<String>) -> Self {
        MigrateError::Source {
            context: context.into(),
            source,
        }
    }

    /// Whether this kind aborts the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MigrateError::RowSanitization { .. }
                | MigrateError::BatchInsert { .. }
                | MigrateError::RowInsert { .. }
                | MigrateError::Constraint { .. }
                | MigrateError::SequenceResolution { .. }
                | MigrateError::OrphanReferences { .. }
        )
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrateError::Connection { .. } => true,
            MigrateError::Source { source, .. } => matches!(
                source,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
            ),
            MigrateError::Target(e) => e.is_closed(),
            _ => false,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Validation(_)
            | MigrateError::Identifier(_)
            | MigrateError::Yaml(_) => EXIT_CONFIG_ERROR,
            MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
            MigrateError::RetriesExhausted { last, .. } => match last.as_ref() {
                MigrateError::Connection { .. } => EXIT_CONNECTION_ERROR,
                _ => EXIT_RUNTIME_ERROR,
            },
            MigrateError::RowCountMismatch { .. } => EXIT_ROW_COUNT_MISMATCH,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
            _ => EXIT_RUNTIME_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
