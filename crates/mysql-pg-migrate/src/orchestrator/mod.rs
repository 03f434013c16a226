//! Migration orchestrator - main workflow coordinator.
//!
//! A run introspects the source, resolves the table order and then drives six
//! passes inside one target transaction:
//!
//! 1. create tables (no constraints),
//! 2. transfer rows and check row counts,
//! 3. reconcile sequences,
//! 4. create indexes and unique constraints,
//! 5. add foreign keys in reverse order,
//! 6. count orphaned references.
//!
//! Any fatal error, including cancellation, rolls the whole transaction back.
//! Failures of single constraints, sequences and orphan queries are logged and
//! recorded on the report instead.

mod report;

pub use report::{MigrationReport, RunStatus, TableReport, Totals};

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn, Dispatch};

use crate::config::Config;
use crate::constraints::{create_foreign_keys, create_indexes, foreign_key_statement, index_statement};
use crate::core::{Ident, SourceReader, TableDescriptor, TargetSession};
use crate::drivers::{MysqlReader, PostgresSession};
use crate::error::{MigrateError, Result};
use crate::introspect::SchemaIntrospector;
use crate::plan::{resolve, MigrationPlan};
use crate::retry::RetryPolicy;
use crate::sequences::SequenceReconciler;
use crate::transfer::{DataTransferEngine, ProgressUpdate, TransferConfig};
use crate::translate::{create_schema_statement, create_table_statement, drop_table_statement, translate_table};
use crate::verify::IntegrityValidator;

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    schema: Ident,
    source: Arc<dyn SourceReader>,
    target: Box<dyn TargetSession>,
    log: Dispatch,
    progress: Option<UnboundedSender<ProgressUpdate>>,
}

/// DDL a run would execute, produced without touching the target.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunPlan {
    pub order: Vec<String>,
    pub cycle_members: Vec<String>,
    pub statements: Vec<String>,
}

/// Connectivity of both endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    pub target_error: Option<String>,
    pub healthy: bool,
}

/// Introspected source schema and the order to migrate it in.
struct SourceSchema {
    plan: MigrationPlan,
    tables: Vec<TableDescriptor>,
}

impl Orchestrator {
    /// Validate the configuration and connect to both databases.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate()?;
        let retry = RetryPolicy::from_config(&config.migration);

        let source = MysqlReader::connect(&config.source, config.migration.max_connections, retry).await?;
        let target = match PostgresSession::connect(&config.target, retry).await {
            Ok(t) => t,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };

        Self::with_connections(config, Arc::new(source), Box::new(target))
    }

    /// Build an orchestrator over existing connections.
    pub fn with_connections(
        config: Config,
        source: Arc<dyn SourceReader>,
        target: Box<dyn TargetSession>,
    ) -> Result<Self> {
        let schema = config.target_schema()?;
        Ok(Self {
            config,
            schema,
            source,
            target,
            log: Dispatch::none(),
            progress: None,
        })
    }

    /// Run all work under `log`.
    pub fn with_log(mut self, log: Dispatch) -> Self {
        self.log = log;
        self
    }

    /// Send per-batch progress updates to `tx`.
    pub fn with_progress(mut self, tx: UnboundedSender<ProgressUpdate>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run the migration.
    ///
    /// Both connections are closed on every exit path.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<MigrationReport> {
        let log = self.log.clone();
        async move {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(MigrateError::Cancelled),
                r = self.execute() => r,
            };

            if let Err(e) = &outcome {
                error!("Migration failed: {}", e);
                match self.target.rollback().await {
                    Ok(()) => info!("Transaction rolled back; target left unchanged"),
                    Err(rb) => warn!("Rollback failed: {}", rb),
                }
            }

            self.close().await;
            outcome
        }
        .with_subscriber(log)
        .await
    }

    /// Introspect the source and render the DDL a run would execute.
    pub async fn dry_run(mut self) -> Result<DryRunPlan> {
        let log = self.log.clone();
        async move {
            let outcome = self.build_dry_run().await;
            self.close().await;
            outcome
        }
        .with_subscriber(log)
        .await
    }

    /// Connect to both databases and round-trip a query on each.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let retry = RetryPolicy::none();

        let start = Instant::now();
        let source = match MysqlReader::connect(&config.source, 1, retry).await {
            Ok(reader) => {
                let ping = reader.ping().await;
                reader.close().await;
                ping
            }
            Err(e) => Err(e),
        };
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = match PostgresSession::connect(&config.target, retry).await {
            Ok(mut session) => {
                let ping = session.ping().await;
                session.close().await;
                ping
            }
            Err(e) => Err(e),
        };
        let target_latency_ms = start.elapsed().as_millis() as u64;

        HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.as_ref().err().map(|e| e.to_string()),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.as_ref().err().map(|e| e.to_string()),
            healthy: source.is_ok() && target.is_ok(),
        }
    }

    async fn close(&mut self) {
        self.target.close().await;
        self.source.close().await;
    }

    async fn introspect(&self) -> Result<SourceSchema> {
        let introspector =
            SchemaIntrospector::new(self.source.as_ref(), self.config.migration.identifier_case);

        let names = introspector.list_tables().await?;
        let edges = introspector.dependency_edges().await?;
        let plan = resolve(&names, &edges);

        let mut tables = Vec::with_capacity(plan.len());
        for name in &plan.order {
            tables.push(introspector.describe(name).await?);
        }
        Ok(SourceSchema { plan, tables })
    }

    async fn build_dry_run(&self) -> Result<DryRunPlan> {
        let SourceSchema { plan, tables } = self.introspect().await?;
        let schema = &self.schema;

        let mut statements = vec![create_schema_statement(schema).sql().to_string()];
        for table in &tables {
            statements.push(drop_table_statement(schema, &table.name).sql().to_string());
            statements.push(create_table_statement(schema, &translate_table(table)).sql().to_string());
        }
        if self.config.migration.create_indexes {
            for table in &tables {
                for index in &table.indexes {
                    statements.push(index_statement(schema, table, index)?.statement.sql().to_string());
                }
            }
        }
        if self.config.migration.create_foreign_keys {
            for table in tables.iter().rev() {
                for fk in &table.foreign_keys {
                    statements.push(foreign_key_statement(schema, table, fk)?.statement.sql().to_string());
                }
            }
        }

        Ok(DryRunPlan {
            order: plan.order,
            cycle_members: plan.cycle_members,
            statements,
        })
    }

    async fn execute(&mut self) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_seconds: 0.0,
            source_database: self.config.source.database.clone(),
            target_schema: self.schema.to_string(),
            order: Vec::new(),
            cycle_members: Vec::new(),
            tables: Vec::new(),
            totals: Totals::default(),
        };
        info!("Starting migration run: {}", report.run_id);

        let SourceSchema { plan, tables } = self.introspect().await?;
        if tables.is_empty() {
            warn!("No tables found in source database {}", report.source_database);
            report.finish(RunStatus::NothingToMigrate);
            return Ok(report);
        }
        info!("Migration order: {}", plan.order.join(" -> "));
        report.order = plan.order;
        report.cycle_members = plan.cycle_members;
        report.tables = tables
            .iter()
            .map(|t| TableReport {
                table: t.name.to_string(),
                source_table: t.source_name.clone(),
                auto_increment_columns: t.auto_increment_columns().map(|c| c.name.to_string()).collect(),
                ..Default::default()
            })
            .collect();

        let Self {
            ref config,
            ref schema,
            ref source,
            ref mut target,
            ref progress,
            ..
        } = *self;
        let source: &dyn SourceReader = source.as_ref();
        let session: &mut dyn TargetSession = target.as_mut();
        let migration = &config.migration;

        session.begin().await?;

        info!("Pass 1: creating {} tables", tables.len());
        session.execute(&create_schema_statement(schema)).await?;
        for table in &tables {
            let definition = translate_table(table);
            session.execute(&drop_table_statement(schema, &table.name)).await?;
            session.execute(&create_table_statement(schema, &definition)).await?;
            info!("Created table {}.{}", schema, table.name);
        }

        info!("Pass 2: transferring data");
        let engine = DataTransferEngine::new(source, TransferConfig::from_config(migration))
            .with_progress(progress.clone());
        let validator = IntegrityValidator::new(source, schema);
        for (table, entry) in tables.iter().zip(report.tables.iter_mut()) {
            let rows_total = source.row_count(&table.source_name).await?;
            let transfer = engine.transfer_table(session, schema, table, rows_total).await?;
            entry.dropped_rows = transfer.dropped_rows;
            entry.fallback_batches = transfer.fallback_batches;
            entry.transfer_ms = transfer.elapsed.as_millis() as u64;

            let check = validator.check_row_count(session, table).await?;
            entry.source_rows = check.source_rows;
            entry.target_rows = check.target_rows;
        }

        info!("Pass 3: reconciling sequences");
        let reconciler = SequenceReconciler::new(schema);
        for (table, entry) in tables.iter().zip(report.tables.iter_mut()) {
            let outcome = reconciler.reconcile(session, table).await?;
            entry.sequences_reset = outcome.reset;
            entry.sequences_failed = outcome.failed;
        }

        if migration.create_indexes {
            info!("Pass 4: creating indexes and unique constraints");
            for (table, entry) in tables.iter().zip(report.tables.iter_mut()) {
                entry.indexes = create_indexes(session, schema, table).await?;
            }
        } else {
            info!("Pass 4: index creation disabled");
        }

        if migration.create_foreign_keys {
            info!("Pass 5: adding foreign keys");
            for (table, entry) in tables.iter().zip(report.tables.iter_mut()).rev() {
                entry.foreign_keys = create_foreign_keys(session, schema, table).await?;
            }
        } else {
            info!("Pass 5: foreign key creation disabled");
        }

        if migration.check_orphans {
            info!("Pass 6: checking referential integrity");
            for (table, entry) in tables.iter().zip(report.tables.iter_mut()) {
                entry.orphans = validator.check_orphans(session, table).await?;
            }
        } else {
            info!("Pass 6: orphan checks disabled");
        }

        report.finish(RunStatus::Completed);
        session.commit().await?;
        info!(
            "Migration committed: {} tables, {} rows in {:.1}s",
            report.totals.tables, report.totals.target_rows, report.duration_seconds
        );
        Ok(report)
    }
}
