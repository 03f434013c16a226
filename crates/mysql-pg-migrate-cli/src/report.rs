//! Plain-text rendering of run results.

use std::fmt::Write;

use mysql_pg_migrate::{DryRunPlan, HealthCheckResult, MigrationReport, RunStatus};

const WIDTH: usize = 60;

/// Render the migration report in the classic layout.
pub fn render_report(report: &MigrationReport) -> String {
    let rule = "=".repeat(WIDTH);
    let mut out = String::new();

    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "MIGRATION REPORT");
    let _ = writeln!(out, "{}", rule);

    if report.status == RunStatus::NothingToMigrate {
        let _ = writeln!(out, "No tables found in source database {}", report.source_database);
    }

    for table in &report.tables {
        let status = if table.row_count_matches() { "SUCCESS" } else { "MISMATCH" };
        let _ = writeln!(
            out,
            "Table: {:<30} MySQL: {:>8} PostgreSQL: {:>8} {}",
            table.table, table.source_rows, table.target_rows, status
        );
        if !table.auto_increment_columns.is_empty() {
            let _ = writeln!(
                out,
                "  Auto-increment columns: {}",
                table.auto_increment_columns.join(", ")
            );
        }
        if !table.dropped_rows.is_empty() {
            let _ = writeln!(out, "  Dropped rows: {}", table.dropped_rows.len());
        }
        let failed: Vec<&str> = table
            .indexes
            .failed
            .iter()
            .chain(&table.foreign_keys.failed)
            .map(String::as_str)
            .collect();
        if !failed.is_empty() {
            let _ = writeln!(out, "  Constraints not created: {}", failed.len());
        }
        if !table.sequences_failed.is_empty() {
            let _ = writeln!(
                out,
                "  Sequences not reset: {}",
                table.sequences_failed.join(", ")
            );
        }
        let orphans = table.orphan_references();
        if orphans > 0 {
            let _ = writeln!(out, "  Orphaned references: {}", orphans);
        }
    }

    let _ = writeln!(out, "{}", "-".repeat(WIDTH));
    let _ = writeln!(
        out,
        "TOTAL RECORDS: MySQL: {:>8} PostgreSQL: {:>8}",
        report.totals.source_rows, report.totals.target_rows
    );
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(
        out,
        "Run ID: {}  Duration: {:.2}s",
        report.run_id, report.duration_seconds
    );
    out
}

/// Render the order and DDL of a dry run.
pub fn render_dry_run(plan: &DryRunPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Migration order: {}", plan.order.join(" -> "));
    if !plan.cycle_members.is_empty() {
        let _ = writeln!(out, "Foreign key cycle: {}", plan.cycle_members.join(", "));
    }
    let _ = writeln!(out);
    for stmt in &plan.statements {
        let _ = writeln!(out, "{};", stmt);
    }
    out
}

/// Render a health check result.
pub fn render_health(result: &HealthCheckResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Health Check Results:");
    let _ = writeln!(
        out,
        "  Source (MySQL): {} ({}ms)",
        if result.source_connected { "OK" } else { "FAILED" },
        result.source_latency_ms
    );
    if let Some(err) = &result.source_error {
        let _ = writeln!(out, "    Error: {}", err);
    }
    let _ = writeln!(
        out,
        "  Target (PostgreSQL): {} ({}ms)",
        if result.target_connected { "OK" } else { "FAILED" },
        result.target_latency_ms
    );
    if let Some(err) = &result.target_error {
        let _ = writeln!(out, "    Error: {}", err);
    }
    let _ = writeln!(
        out,
        "\n  Overall: {}",
        if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
    );
    out
}
