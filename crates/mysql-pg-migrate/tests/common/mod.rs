//! In-memory source and target used by the scenario tests.
//!
//! `FakeSource` serves catalog rows and data from plain vectors.
//! `FakeTarget` interprets the handful of statement shapes the migration
//! emits, keeps a savepoint stack of snapshots and records every statement so
//! tests can assert on what reached the target.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mysql_pg_migrate::core::{
    Batch, ForeignKeyEdge, RawColumn, RawForeignKey, RawIndexRow, Row, SqlValue, Statement,
};
use mysql_pg_migrate::{MigrateError, Result, SourceReader, TableDescriptor, TargetSession};

// ============ Source ============

/// One source table with its catalog rows and data.
#[derive(Clone, Default)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<RawColumn>,
    pub foreign_keys: Vec<RawForeignKey>,
    pub indexes: Vec<RawIndexRow>,
    pub rows: Vec<Row>,
}

impl SourceTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn column(mut self, name: &str, column_type: &str, key: &str, extra: &str) -> Self {
        self.columns.push(RawColumn {
            name: name.to_string(),
            column_type: column_type.to_string(),
            nullable: key != "PRI",
            key: key.to_string(),
            default: None,
            extra: extra.to_string(),
        });
        self
    }

    pub fn column_default(mut self, name: &str, column_type: &str, default: &str) -> Self {
        self.columns.push(RawColumn {
            name: name.to_string(),
            column_type: column_type.to_string(),
            nullable: true,
            key: String::new(),
            default: Some(default.to_string()),
            extra: "DEFAULT_GENERATED".to_string(),
        });
        self
    }

    pub fn foreign_key(mut self, column: &str, parent: &str, parent_column: &str) -> Self {
        self.foreign_keys.push(RawForeignKey {
            constraint_name: format!("{}_ibfk_{}", self.name, self.foreign_keys.len() + 1),
            column: column.to_string(),
            referenced_table: parent.to_string(),
            referenced_column: parent_column.to_string(),
            update_rule: Some("RESTRICT".to_string()),
            delete_rule: Some("CASCADE".to_string()),
        });
        self
    }

    pub fn index(mut self, index: &str, column: &str, unique: bool) -> Self {
        self.indexes.push(RawIndexRow {
            index_name: index.to_string(),
            column: Some(column.to_string()),
            non_unique: !unique,
            index_type: "BTREE".to_string(),
        });
        self
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }
}

/// Source reader over in-memory tables.
#[derive(Default)]
pub struct FakeSource {
    tables: Vec<SourceTable>,
    /// Reported row counts that differ from the data actually served.
    count_overrides: BTreeMap<String, i64>,
    closed: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn new(tables: Vec<SourceTable>) -> Self {
        Self {
            tables,
            ..Default::default()
        }
    }

    pub fn with_row_count(mut self, table: &str, count: i64) -> Self {
        self.count_overrides.insert(table.to_string(), count);
        self
    }

    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }

    fn table(&self, name: &str) -> Result<&SourceTable> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| MigrateError::Validation(format!("no such source table {}", name)))
    }
}

#[async_trait]
impl SourceReader for FakeSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.name.clone()).collect();
        names.sort();
        Ok(names)
    }

    async fn foreign_key_edges(&self) -> Result<Vec<ForeignKeyEdge>> {
        Ok(self
            .tables
            .iter()
            .flat_map(|t| {
                t.foreign_keys.iter().map(move |fk| ForeignKeyEdge {
                    child_table: t.name.clone(),
                    child_column: fk.column.clone(),
                    parent_table: fk.referenced_table.clone(),
                    parent_column: fk.referenced_column.clone(),
                })
            })
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        Ok(self.table(table)?.columns.clone())
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        Ok(self.table(table)?.foreign_keys.clone())
    }

    async fn index_rows(&self, table: &str) -> Result<Vec<RawIndexRow>> {
        Ok(self.table(table)?.indexes.clone())
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        if let Some(count) = self.count_overrides.get(table) {
            return Ok(*count);
        }
        Ok(self.table(table)?.rows.len() as i64)
    }

    async fn read_rows(&self, table: &TableDescriptor, offset: u64, limit: usize) -> Result<Batch> {
        let rows = &self.table(&table.source_name)?.rows;
        let start = (offset as usize).min(rows.len());
        let end = (start + limit).min(rows.len());
        Ok(Batch::new(offset, rows[start..end].to_vec()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "fake-mysql"
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============ Target ============

/// Rows of one target table, keyed by column name.
#[derive(Clone, Debug, Default)]
pub struct TargetTable {
    pub rows: Vec<BTreeMap<String, SqlValue>>,
}

/// Data that savepoints and rollbacks restore.
#[derive(Clone, Debug, Default)]
pub struct TargetData {
    /// Keyed by quoted qualified name, e.g. `"public"."orders"`.
    pub tables: BTreeMap<String, TargetTable>,
    /// Quoted qualified sequence name to its last `setval` value.
    pub sequences: BTreeMap<String, Option<i64>>,
}

#[derive(Debug, Default)]
pub struct TargetState {
    pub data: TargetData,
    /// Every statement received, including failed ones.
    pub statements: Vec<String>,
    pub began: bool,
    pub committed: bool,
    pub rolled_back: bool,
    pub closed: bool,
    begin_snapshot: Option<TargetData>,
    savepoints: Vec<(&'static str, TargetData)>,
}

impl TargetState {
    pub fn row_count(&self, qualified: &str) -> usize {
        self.data.tables.get(qualified).map_or(0, |t| t.rows.len())
    }

    pub fn sequence(&self, qualified: &str) -> Option<i64> {
        self.data.sequences.get(qualified).copied().flatten()
    }

    pub fn executed(&self, fragment: &str) -> bool {
        self.statements.iter().any(|s| s.contains(fragment))
    }
}

/// Target session interpreting migration statements in memory.
#[derive(Default)]
pub struct FakeTarget {
    state: Arc<Mutex<TargetState>>,
    /// Any statement binding this value fails.
    poison: Option<SqlValue>,
    /// Any statement containing one of these fragments fails.
    failing_sql: Vec<String>,
}

impl FakeTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poison(mut self, value: SqlValue) -> Self {
        self.poison = Some(value);
        self
    }

    pub fn failing_on(mut self, fragment: &str) -> Self {
        self.failing_sql.push(fragment.to_string());
        self
    }

    /// Shared view of the state for assertions after the session is moved.
    pub fn state(&self) -> Arc<Mutex<TargetState>> {
        self.state.clone()
    }

    fn check(&self, stmt: &Statement) -> Result<()> {
        if let Some(poison) = &self.poison {
            if stmt.params().contains(poison) {
                return Err(MigrateError::Validation(format!(
                    "invalid input syntax for type integer: {}",
                    poison
                )));
            }
        }
        if let Some(fragment) = self.failing_sql.iter().find(|f| stmt.sql().contains(f.as_str())) {
            return Err(MigrateError::Validation(format!("statement rejected: {}", fragment)));
        }
        Ok(())
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}

fn between<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = s.find(start)? + start.len();
    let to = s[from..].find(end)? + from;
    Some(&s[from..to])
}

/// `"public"."orders"` to (`"public"`, `orders`).
fn split_qualified(qualified: &str) -> (String, String) {
    match qualified.split_once("\".\"") {
        Some((schema, table)) => (format!("{}\"", schema), strip_quotes(table)),
        None => (String::new(), strip_quotes(qualified)),
    }
}

fn apply_statement(data: &mut TargetData, stmt: &Statement) -> Result<u64> {
    let sql = stmt.sql();

    if sql.starts_with("CREATE TABLE ") {
        let qualified = between(sql, "CREATE TABLE ", " (").unwrap_or_default().to_string();
        let (schema, table) = split_qualified(&qualified);
        for line in sql.lines().skip(1) {
            let line = line.trim();
            if line.starts_with('"') && line.contains("SERIAL") {
                let column = strip_quotes(line.split_whitespace().next().unwrap_or_default());
                let sequence = format!("{}.\"{}_{}_seq\"", schema, table, column);
                data.sequences.insert(sequence, None);
            }
        }
        data.tables.insert(qualified, TargetTable::default());
        return Ok(0);
    }

    if sql.starts_with("DROP TABLE IF EXISTS ") {
        let qualified = between(sql, "DROP TABLE IF EXISTS ", " CASCADE").unwrap_or_default();
        data.tables.remove(qualified);
        return Ok(0);
    }

    if sql.starts_with("INSERT INTO ") {
        let qualified = between(sql, "INSERT INTO ", " (").unwrap_or_default().to_string();
        let columns: Vec<String> = between(sql, " (", ") VALUES")
            .unwrap_or_default()
            .split(", ")
            .map(strip_quotes)
            .collect();
        let table = data
            .tables
            .get_mut(&qualified)
            .ok_or_else(|| MigrateError::Validation(format!("relation {} does not exist", qualified)))?;
        let mut inserted = 0;
        for values in stmt.params().chunks(columns.len()) {
            table
                .rows
                .push(columns.iter().cloned().zip(values.iter().cloned()).collect());
            inserted += 1;
        }
        return Ok(inserted);
    }

    // Schema, index and constraint DDL have no effect on the model.
    Ok(0)
}

fn answer_query(data: &mut TargetData, stmt: &Statement) -> Result<Option<i64>> {
    let sql = stmt.sql();

    if sql.starts_with("SELECT setval(") {
        let name = match stmt.params().first() {
            Some(SqlValue::Text(name)) => name.clone(),
            _ => return Err(MigrateError::Validation("setval without a name".into())),
        };
        let value = match stmt.params().get(1) {
            Some(SqlValue::Int(v)) => *v,
            _ => return Err(MigrateError::Validation("setval without a value".into())),
        };
        return match data.sequences.get_mut(&name) {
            Some(slot) => {
                *slot = Some(value);
                Ok(Some(value))
            }
            None => Err(MigrateError::Validation(format!("relation {} does not exist", name))),
        };
    }

    if sql.starts_with("SELECT CAST(MAX(") {
        let column = strip_quotes(between(sql, "MAX(", ")").unwrap_or_default());
        let qualified = sql.rsplit(" FROM ").next().unwrap_or_default();
        let table = data.tables.get(qualified);
        let max = table
            .into_iter()
            .flat_map(|t| t.rows.iter())
            .filter_map(|r| match r.get(&column) {
                Some(SqlValue::Int(v)) => Some(*v),
                _ => None,
            })
            .max();
        return Ok(max);
    }

    if sql.starts_with("SELECT COUNT(*) FROM ") {
        if sql.contains("NOT EXISTS") {
            return Ok(Some(0));
        }
        let qualified = &sql["SELECT COUNT(*) FROM ".len()..];
        return Ok(Some(data.tables.get(qualified).map_or(0, |t| t.rows.len() as i64)));
    }

    Err(MigrateError::Validation(format!("unexpected query: {}", sql)))
}

#[async_trait]
impl TargetSession for FakeTarget {
    async fn begin(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.statements.push("BEGIN".into());
        state.began = true;
        state.begin_snapshot = Some(state.data.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.statements.push("COMMIT".into());
        state.committed = true;
        state.begin_snapshot = None;
        state.savepoints.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(snapshot) = state.begin_snapshot.take() {
            state.statements.push("ROLLBACK".into());
            state.data = snapshot;
            state.savepoints.clear();
            state.rolled_back = true;
        }
        Ok(())
    }

    async fn savepoint(&mut self, name: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let snapshot = state.data.clone();
        state.savepoints.push((name, snapshot));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.savepoints.pop() {
            Some((top, _)) if top == name => Ok(()),
            other => Err(MigrateError::Validation(format!(
                "release of {} with {:?} on top",
                name,
                other.map(|(n, _)| n)
            ))),
        }
    }

    async fn rollback_to_savepoint(&mut self, name: &'static str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.savepoints.pop() {
            Some((top, snapshot)) if top == name => {
                state.data = snapshot;
                Ok(())
            }
            other => Err(MigrateError::Validation(format!(
                "rollback to {} with {:?} on top",
                name,
                other.map(|(n, _)| n)
            ))),
        }
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(stmt.sql().to_string());
        self.check(stmt)?;
        apply_statement(&mut state.data, stmt)
    }

    async fn query_i64(&mut self, stmt: &Statement) -> Result<Option<i64>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(stmt.sql().to_string());
        self.check(stmt)?;
        answer_query(&mut state.data, stmt)
    }

    async fn query_strings(&mut self, stmt: &Statement) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(stmt.sql().to_string());
        self.check(stmt)?;
        Ok(Vec::new())
    }

    async fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    fn db_type(&self) -> &str {
        "fake-postgres"
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ============ Helpers ============

pub fn int(v: i64) -> SqlValue {
    SqlValue::Int(v)
}

pub fn text(v: &str) -> SqlValue {
    SqlValue::Text(v.to_string())
}
