//! Scenario tests for the migration passes, run against in-memory databases.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use mysql_pg_migrate::core::{Batch, Ident, IdentifierCase, Row, SqlValue};
use mysql_pg_migrate::introspect::build_descriptor;
use mysql_pg_migrate::translate::{create_table_statement, translate_table};
use mysql_pg_migrate::{
    Config, DataTransferEngine, MigrateError, Orchestrator, RunStatus, TargetSession, TransferConfig,
};
use tokio_util::sync::CancellationToken;

use common::{int, text, FakeSource, FakeTarget, SourceTable};

const ORDERS: &str = "\"public\".\"orders\"";
const CUSTOMERS: &str = "\"public\".\"customers\"";

fn customers() -> SourceTable {
    SourceTable::new("customers")
        .column("id", "int", "PRI", "auto_increment")
        .column("name", "varchar(100)", "", "")
        .index("uq_name", "name", true)
        .rows(vec![
            vec![int(1), text("Ann")],
            vec![int(2), text("Bob")],
            vec![int(3), text("Cy")],
        ])
}

fn orders() -> SourceTable {
    SourceTable::new("orders")
        .column("id", "int", "PRI", "auto_increment")
        .column("customer_id", "int", "MUL", "")
        .column_default("created_at", "datetime", "CURRENT_TIMESTAMP")
        .foreign_key("customer_id", "customers", "id")
        .index("ix_customer", "customer_id", false)
        .rows(vec![
            vec![int(1), int(1), text("2024-01-15 10:00:00")],
            vec![int(2), int(2), text("0000-00-00 00:00:00")],
            vec![int(3), int(1), SqlValue::Null],
        ])
}

fn orchestrator(source: FakeSource, target: FakeTarget) -> Orchestrator {
    Orchestrator::with_connections(Config::default(), Arc::new(source), Box::new(target)).unwrap()
}

fn position(statements: &[String], fragment: &str) -> usize {
    statements
        .iter()
        .position(|s| s.contains(fragment))
        .unwrap_or_else(|| panic!("no statement contains {}", fragment))
}

// ============ Full runs ============

#[tokio::test]
async fn test_orders_and_customers_migrate() {
    let source = FakeSource::new(vec![orders(), customers()]);
    let source_closed = source.closed_flag();
    let target = FakeTarget::new();
    let state = target.state();

    let report = orchestrator(source, target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.order, vec!["customers", "orders"]);
    assert!(report.all_match());
    assert_eq!(report.totals.source_rows, 6);
    assert_eq!(report.totals.target_rows, 6);

    let orders_report = &report.tables[1];
    assert_eq!(orders_report.table, "orders");
    assert_eq!(orders_report.auto_increment_columns, vec!["id"]);
    assert_eq!(orders_report.sequences_reset.len(), 1);
    assert_eq!(orders_report.sequences_reset[0].sequence, "orders_id_seq");
    assert_eq!(orders_report.sequences_reset[0].next_value, 4);
    assert_eq!(orders_report.indexes.created, 1);
    assert_eq!(orders_report.foreign_keys.created, 1);
    assert_eq!(orders_report.orphans[0].orphans, Some(0));

    let state = state.lock().unwrap();
    assert!(state.committed);
    assert!(!state.rolled_back);
    assert!(state.closed);
    assert!(source_closed.load(Ordering::SeqCst));

    assert_eq!(state.row_count(ORDERS), 3);
    assert_eq!(state.row_count(CUSTOMERS), 3);
    assert_eq!(state.sequence("\"public\".\"orders_id_seq\""), Some(3));
    assert_eq!(state.sequence("\"public\".\"customers_id_seq\""), Some(3));

    let create_orders = &state.statements[position(&state.statements, "CREATE TABLE \"public\".\"orders\"")];
    assert!(create_orders.contains("\"id\" SERIAL NOT NULL"));
    assert!(create_orders.contains("\"created_at\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
    assert!(create_orders.contains("PRIMARY KEY (\"id\")"));
    assert!(!create_orders.contains("FOREIGN KEY"));

    assert!(state.executed(
        "ALTER TABLE \"public\".\"orders\" ADD CONSTRAINT \"fk_orders_customer_id\" \
         FOREIGN KEY (\"customer_id\") REFERENCES \"public\".\"customers\" (\"id\") \
         ON UPDATE RESTRICT ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED"
    ));
    assert!(state.executed("CREATE INDEX \"idx_orders_ix_customer\" ON \"public\".\"orders\" (\"customer_id\")"));
    assert!(state.executed("ADD CONSTRAINT \"uk_customers_uq_name\" UNIQUE (\"name\")"));
}

#[tokio::test]
async fn test_passes_run_in_order() {
    let target = FakeTarget::new();
    let state = target.state();
    orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    let s = &state.statements;
    let parent_created = position(s, "CREATE TABLE \"public\".\"customers\"");
    let child_created = position(s, "CREATE TABLE \"public\".\"orders\"");
    let first_insert = position(s, "INSERT INTO");
    let first_setval = position(s, "SELECT setval(");
    let first_index = position(s, "CREATE INDEX");
    let first_fk = position(s, "FOREIGN KEY");
    let first_orphan = position(s, " AS c WHERE c.");
    assert!(parent_created > position(s, "CREATE SCHEMA IF NOT EXISTS"));

    assert_eq!(s[0], "BEGIN");
    assert!(parent_created < child_created);
    assert!(child_created < first_insert);
    assert!(first_insert < first_setval);
    assert!(first_setval < first_index);
    assert!(first_index < first_fk);
    assert!(first_fk < first_orphan);
    assert_eq!(s.last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_zero_dates_migrate_as_null() {
    let target = FakeTarget::new();
    let state = target.state();
    orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let state = state.lock().unwrap();
    let rows = &state.data.tables[ORDERS].rows;
    assert_eq!(rows[0]["created_at"], text("2024-01-15 10:00:00"));
    assert_eq!(rows[1]["created_at"], SqlValue::Null);
    assert_eq!(rows[1]["id"], int(2));
}

#[tokio::test]
async fn test_row_count_mismatch_aborts_before_constraints() {
    let source = FakeSource::new(vec![orders(), customers()]).with_row_count("orders", 4);
    let source_closed = source.closed_flag();
    let target = FakeTarget::new();
    let state = target.state();

    let err = orchestrator(source, target)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    match &err {
        MigrateError::RowCountMismatch {
            table,
            source_rows,
            target_rows,
        } => {
            assert_eq!(table, "orders");
            assert_eq!(*source_rows, 4);
            assert_eq!(*target_rows, 3);
        }
        other => panic!("expected a row count mismatch, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 4);

    let state = state.lock().unwrap();
    assert!(state.rolled_back);
    assert!(!state.committed);
    assert!(state.closed);
    assert!(source_closed.load(Ordering::SeqCst));
    assert!(!state.executed("setval"));
    assert!(!state.executed("CREATE INDEX"));
    assert!(!state.executed("ADD CONSTRAINT"));
    // Rolled back to before the first CREATE TABLE.
    assert!(state.data.tables.is_empty());
}

#[tokio::test]
async fn test_dropped_row_fails_row_count_check() {
    let mut bad_orders = orders();
    bad_orders.rows[1][1] = text("not-a-number");
    let target = FakeTarget::new().with_poison(text("not-a-number"));
    let state = target.state();

    let err = orchestrator(FakeSource::new(vec![bad_orders, customers()]), target)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrateError::RowCountMismatch { source_rows: 3, target_rows: 2, .. }
    ));
    assert!(state.lock().unwrap().rolled_back);
}

#[tokio::test]
async fn test_constraint_failure_is_not_fatal() {
    let target = FakeTarget::new().failing_on("FOREIGN KEY");
    let state = target.state();

    let report = orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tables[1].foreign_keys.created, 0);
    assert_eq!(report.tables[1].foreign_keys.failed.len(), 1);
    assert_eq!(report.totals.constraints_failed, 1);

    let state = state.lock().unwrap();
    assert!(state.committed);
    assert_eq!(state.row_count(ORDERS), 3);
}

#[tokio::test]
async fn test_unresolvable_sequence_is_not_fatal() {
    let target = FakeTarget::new().failing_on("setval");
    let state = target.state();

    let report = orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert!(report.tables.iter().all(|t| t.sequences_reset.is_empty()));
    assert_eq!(report.tables[1].sequences_failed, vec!["id"]);
    assert!(state.lock().unwrap().committed);
}

#[tokio::test]
async fn test_cancelled_run_rolls_back() {
    let target = FakeTarget::new();
    let state = target.state();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .run(cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::Cancelled));
    assert_eq!(err.exit_code(), 5);
    let state = state.lock().unwrap();
    assert!(!state.committed);
    assert!(state.closed);
}

#[tokio::test]
async fn test_empty_source_leaves_target_untouched() {
    let target = FakeTarget::new();
    let state = target.state();

    let report = orchestrator(FakeSource::new(vec![]), target)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::NothingToMigrate);
    assert!(report.tables.is_empty());
    let state = state.lock().unwrap();
    assert!(state.statements.is_empty());
    assert!(state.closed);
}

#[tokio::test]
async fn test_foreign_key_cycle_still_migrates() {
    let a = SourceTable::new("a")
        .column("id", "int", "PRI", "")
        .column("b_id", "int", "", "")
        .foreign_key("b_id", "b", "id")
        .rows(vec![vec![int(1), SqlValue::Null]]);
    let b = SourceTable::new("b")
        .column("id", "int", "PRI", "")
        .column("a_id", "int", "", "")
        .foreign_key("a_id", "a", "id")
        .rows(vec![vec![int(1), int(1)]]);

    let report = orchestrator(FakeSource::new(vec![b, a]), FakeTarget::new())
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.order, vec!["a", "b"]);
    assert_eq!(report.cycle_members, vec!["a", "b"]);
    assert_eq!(report.totals.target_rows, 2);
}

#[tokio::test]
async fn test_preserved_case_names() {
    let table = SourceTable::new("Customers")
        .column("ID", "int", "PRI", "auto_increment")
        .rows(vec![vec![int(7)]]);
    let mut config = Config::default();
    config.migration.identifier_case = IdentifierCase::Preserve;
    let target = FakeTarget::new();
    let state = target.state();

    let report = Orchestrator::with_connections(config, Arc::new(FakeSource::new(vec![table])), Box::new(target))
        .unwrap()
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.tables[0].table, "Customers");
    assert_eq!(report.tables[0].sequences_reset[0].sequence, "Customers_ID_seq");
    let state = state.lock().unwrap();
    assert!(state.executed("CREATE TABLE \"public\".\"Customers\""));
    assert_eq!(state.sequence("\"public\".\"Customers_ID_seq\""), Some(7));
}

#[tokio::test]
async fn test_dry_run_does_not_touch_target() {
    let target = FakeTarget::new();
    let state = target.state();

    let plan = orchestrator(FakeSource::new(vec![orders(), customers()]), target)
        .dry_run()
        .await
        .unwrap();

    assert_eq!(plan.order, vec!["customers", "orders"]);
    assert_eq!(plan.statements[0], "CREATE SCHEMA IF NOT EXISTS \"public\"");
    assert!(plan.statements.iter().any(|s| s.starts_with("CREATE TABLE \"public\".\"orders\"")));
    assert!(plan.statements.iter().any(|s| s.contains("DEFERRABLE INITIALLY DEFERRED")));

    let state = state.lock().unwrap();
    assert!(state.statements.is_empty());
    assert!(state.closed);
}

// ============ Transfer engine ============

fn events_table(rows: usize) -> (mysql_pg_migrate::TableDescriptor, Vec<Row>) {
    let columns = SourceTable::new("events")
        .column("id", "int", "PRI", "")
        .column("amount", "int", "", "")
        .columns;
    let table = build_descriptor(IdentifierCase::Lower, "events", &columns, &[], &[]).unwrap();
    let data = (1..=rows as i64).map(|i| vec![int(i), int(i * 10)]).collect();
    (table, data)
}

#[tokio::test]
async fn test_bad_row_falls_back_row_by_row() {
    let schema = Ident::new("public").unwrap();
    let (table, mut rows) = events_table(1000);
    rows[500][1] = text("not-a-number");

    let mut target = FakeTarget::new().with_poison(text("not-a-number"));
    let state = target.state();
    target
        .execute(&create_table_statement(&schema, &translate_table(&table)))
        .await
        .unwrap();

    let source = FakeSource::new(vec![]);
    let engine = DataTransferEngine::new(&source, TransferConfig::default());
    let result = engine
        .write_batch(&mut target, &schema, &table, Batch::new(0, rows))
        .await
        .unwrap();

    assert_eq!(result.attempted, 1000);
    assert!(result.fell_back);
    assert_eq!(result.inserted, 999);
    assert_eq!(result.dropped_rows.len(), 1);
    assert_eq!(result.dropped_rows[0].row, 501);
    assert_eq!(state.lock().unwrap().row_count("\"public\".\"events\""), 999);
}

#[tokio::test]
async fn test_transfer_reads_every_batch_and_reports_progress() {
    let schema = Ident::new("public").unwrap();
    let (table, rows) = events_table(2500);
    let source = FakeSource::new(vec![SourceTable::new("events").rows(rows)]);

    let mut target = FakeTarget::new();
    let state = target.state();
    target
        .execute(&create_table_statement(&schema, &translate_table(&table)))
        .await
        .unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = DataTransferEngine::new(&source, TransferConfig { batch_size: 1000 }).with_progress(Some(tx));
    let stats = engine
        .transfer_table(&mut target, &schema, &table, 2500)
        .await
        .unwrap();

    assert_eq!(stats.rows_read, 2500);
    assert_eq!(stats.rows_inserted, 2500);
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.fallback_batches, 0);
    assert_eq!(state.lock().unwrap().row_count("\"public\".\"events\""), 2500);

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    let done: Vec<u64> = updates.iter().map(|u| u.rows_done).collect();
    assert_eq!(done, vec![1000, 2000, 2500]);
    assert!(updates.iter().all(|u| u.rows_total == 2500 && u.table == "events"));
}
