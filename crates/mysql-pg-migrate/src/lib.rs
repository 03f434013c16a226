//! # mysql-pg-migrate
//!
//! One-shot MySQL to PostgreSQL schema and data migration library.
//!
//! A run reads the live MySQL catalog, orders tables by their foreign key
//! dependencies and replays schema and data into PostgreSQL inside a single
//! transaction:
//!
//! - **Schema translation** of column types, defaults and primary keys
//! - **Batched transfer** with zero-date sanitization and row-level fallback
//! - **Sequence reconciliation** so auto-increment columns continue past the
//!   migrated data
//! - **Deferred foreign keys** and secondary indexes added after the data
//! - **Integrity checks**: fatal row-count comparison, non-fatal orphan counts
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, LogHandle, LogOptions, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> mysql_pg_migrate::Result<()> {
//! let config = Config::load("config.yaml")?;
//! let log = LogHandle::open("migration.log", &LogOptions::default())?;
//! let report = Orchestrator::connect(config)
//!     .await?
//!     .with_log(log.dispatch())
//!     .run(CancellationToken::new())
//!     .await?;
//! println!("Migrated {} rows", report.totals.target_rows);
//! log.close();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constraints;
pub mod core;
pub mod drivers;
pub mod error;
pub mod introspect;
pub mod logging;
pub mod orchestrator;
pub mod plan;
pub mod retry;
pub mod sequences;
pub mod transfer;
pub mod translate;
pub mod typemap;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use core::{Ident, IdentifierCase, SourceReader, SqlValue, TableDescriptor, TargetSession};
pub use error::{MigrateError, Result};
pub use introspect::SchemaIntrospector;
pub use logging::{ConsoleFormat, LogHandle, LogOptions};
pub use orchestrator::{
    DryRunPlan, HealthCheckResult, MigrationReport, Orchestrator, RunStatus, TableReport, Totals,
};
pub use plan::{DependencyGraph, MigrationPlan};
pub use retry::RetryPolicy;
pub use sequences::SequenceReconciler;
pub use transfer::{BatchResult, DataTransferEngine, ProgressUpdate, TransferConfig};
pub use typemap::TypeCatalog;
pub use verify::IntegrityValidator;
