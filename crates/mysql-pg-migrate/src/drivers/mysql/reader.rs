//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait over an SQLx connection pool. Catalog
//! strings are cast to CHAR because information_schema may hand back
//! VARBINARY under some collations.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Row, ValueRef};
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::query::{QueryBuilder, Statement};
use crate::core::schema::{
    ColumnDescriptor, ForeignKeyEdge, RawColumn, RawForeignKey, RawIndexRow, TableDescriptor,
};
use crate::core::traits::SourceReader;
use crate::core::value::{Batch, Row as ValueRow, SqlValue};
use crate::core::Ident;
use crate::error::{MigrateError, Result};
use crate::retry::RetryPolicy;

use super::MysqlDialect;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

type DecodeResult<T> = std::result::Result<T, sqlx::Error>;

/// How a column is fetched so it decodes into a [`SqlValue`] without
/// per-type driver conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Projection {
    /// `CAST(col AS SIGNED)`, decoded as i64.
    Integer,
    /// `CAST(col + 0 AS SIGNED)`, BIT columns as integers.
    Bit,
    /// `CAST(col + 0 AS CHAR)`, BIT(64) columns as decimal text.
    WideBit,
    /// Raw bytes.
    Binary,
    /// `CAST(ST_AsText(col) AS CHAR)`, geometry as WKT.
    Geometry,
    /// `CAST(col AS CHAR)`, so zero dates survive as text.
    Text,
}

impl Projection {
    /// Values above `i64::MAX` would wrap under `AS SIGNED`, so unsigned
    /// BIGINT and BIT(64) are fetched as text and range-checked on bind.
    fn for_column(column: &ColumnDescriptor) -> Self {
        let source_type = column.source_type.to_ascii_lowercase();
        match Self::for_base_type(&column.base_type) {
            Projection::Integer if column.base_type == "bigint" && source_type.contains("unsigned") => {
                Projection::Text
            }
            Projection::Bit if type_width(&source_type).is_some_and(|w| w > 63) => Projection::WideBit,
            projection => projection,
        }
    }

    fn for_base_type(base_type: &str) -> Self {
        match base_type {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                Projection::Integer
            }
            "bit" => Projection::Bit,
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                Projection::Binary
            }
            "geometry" | "point" | "linestring" | "polygon" | "multipoint" | "multilinestring"
            | "multipolygon" | "geometrycollection" | "geomcollection" => Projection::Geometry,
            _ => Projection::Text,
        }
    }

    fn write(&self, q: &mut QueryBuilder<MysqlDialect>, column: &Ident) {
        match self {
            Projection::Integer => q.push("CAST(").push_ident(column).push(" AS SIGNED)"),
            Projection::Bit => q.push("CAST(").push_ident(column).push(" + 0 AS SIGNED)"),
            Projection::WideBit => q.push("CAST(").push_ident(column).push(" + 0 AS CHAR)"),
            Projection::Binary => q.push_ident(column),
            Projection::Geometry => q
                .push("CAST(ST_AsText(")
                .push_ident(column)
                .push(") AS CHAR)"),
            Projection::Text => q.push("CAST(").push_ident(column).push(" AS CHAR)"),
        };
    }
}

/// Width from a `type(n)` source type.
fn type_width(source_type: &str) -> Option<u32> {
    let start = source_type.find('(')? + 1;
    let end = source_type[start..].find(')')? + start;
    source_type[start..end].trim().parse().ok()
}

/// Build the paged SELECT for a table, projecting columns in descriptor order.
///
/// No ORDER BY: each row is visited once per offset window, in whatever
/// order the server scans the table.
fn select_page(table: &TableDescriptor, offset: u64, limit: usize) -> Result<Statement> {
    let mut q = QueryBuilder::new(MysqlDialect);
    q.push("SELECT ");
    for (i, col) in table.columns.iter().enumerate() {
        if i > 0 {
            q.push(", ");
        }
        let source = Ident::new(col.source_name.as_str())?;
        Projection::for_column(col).write(&mut q, &source);
    }
    q.push(" FROM ")
        .push_ident(&Ident::new(table.source_name.as_str())?)
        .push(" LIMIT ")
        .push_bind(limit as i64)
        .push(" OFFSET ")
        .push_bind(offset as i64);
    Ok(q.build())
}

/// Undo MariaDB's literal rendering of `COLUMN_DEFAULT`.
///
/// MariaDB 10.2.7+ reports defaults as SQL literals: strings in single
/// quotes with `''` escapes, and the bare word `NULL` for no default.
/// MySQL reports the value itself, so it passes through untouched.
fn catalog_default(raw: Option<String>, literal_defaults: bool) -> Option<String> {
    let raw = raw?;
    if !literal_defaults {
        return Some(raw);
    }
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("NULL") {
        return None;
    }
    match trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        Some(inner) => Some(inner.replace("''", "'")),
        None => Some(raw),
    }
}

/// Map a MySQL `ssl_mode` string to the SQLx setting.
pub fn mysql_ssl_mode(mode: &str) -> Result<MySqlSslMode> {
    match mode.to_lowercase().as_str() {
        "disabled" => Ok(MySqlSslMode::Disabled),
        "preferred" | "" => Ok(MySqlSslMode::Preferred),
        "required" => Ok(MySqlSslMode::Required),
        "verify_ca" => Ok(MySqlSslMode::VerifyCa),
        "verify_identity" => Ok(MySqlSslMode::VerifyIdentity),
        other => Err(MigrateError::Config(format!(
            "Invalid source ssl_mode '{}'. Valid values: disabled, preferred, required, verify_ca, verify_identity",
            other
        ))),
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
    }
}

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
    retry: RetryPolicy,
    /// Server is MariaDB, which renders column defaults as literals.
    mariadb: bool,
}

impl MysqlReader {
    /// Connect to the source, retrying transient failures.
    pub async fn connect(
        config: &SourceConfig,
        max_connections: u32,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let endpoint = config.endpoint();
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(mysql_ssl_mode(&config.ssl_mode)?);

        let (pool, version) = retry
            .run("connecting to MySQL source", || async {
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections.max(1))
                    .acquire_timeout(POOL_CONNECTION_TIMEOUT)
                    .connect_with(options.clone())
                    .await
                    .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
                let version: String = sqlx::query_scalar("SELECT CAST(VERSION() AS CHAR)")
                    .fetch_one(&pool)
                    .await
                    .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
                Ok((pool, version))
            })
            .await?;

        info!("Connected to MySQL source: {} (server {})", endpoint, version);

        Ok(Self {
            pool,
            database: config.database.clone(),
            retry,
            mariadb: version.to_ascii_lowercase().contains("mariadb"),
        })
    }

    /// Run a metadata query with `binds`, retrying transient failures.
    async fn fetch(&self, sql: &str, binds: &[SqlValue], context: &str) -> Result<Vec<MySqlRow>> {
        self.retry
            .run(context, || async {
                let mut query = sqlx::query(sql);
                for value in binds {
                    query = bind_value(query, value);
                }
                query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| MigrateError::source_query(e, context))
            })
            .await
    }

    fn schema_and_table(&self, table: &str) -> [SqlValue; 2] {
        [
            SqlValue::from(self.database.as_str()),
            SqlValue::from(table),
        ]
    }

    fn decode_row(row: &MySqlRow, projections: &[Projection]) -> DecodeResult<ValueRow> {
        let mut values = Vec::with_capacity(projections.len());
        for (i, projection) in projections.iter().enumerate() {
            if row.try_get_raw(i)?.is_null() {
                values.push(SqlValue::Null);
                continue;
            }
            let value = match projection {
                Projection::Integer | Projection::Bit => SqlValue::Int(row.try_get::<i64, _>(i)?),
                Projection::Binary => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?),
                Projection::WideBit | Projection::Geometry | Projection::Text => {
                    SqlValue::Text(row.try_get::<String, _>(i)?)
                }
            };
            values.push(value);
        }
        Ok(values)
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows = self
            .fetch(query, &[SqlValue::from(self.database.as_str())], "listing MySQL tables")
            .await?;
        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>("TABLE_NAME"))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::source_query(e, "decoding MySQL table list"))?;

        info!("Found {} tables in MySQL database '{}'", tables.len(), self.database);
        Ok(tables)
    }

    async fn foreign_key_edges(&self) -> Result<Vec<ForeignKeyEdge>> {
        let query = r#"
            SELECT
                CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_NAME IS NOT NULL
              AND REFERENCED_TABLE_SCHEMA = TABLE_SCHEMA
            ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

        let rows = self
            .fetch(query, &[SqlValue::from(self.database.as_str())], "loading MySQL foreign key graph")
            .await?;

        rows.iter()
            .map(|row| -> DecodeResult<ForeignKeyEdge> {
                Ok(ForeignKeyEdge {
                    child_table: row.try_get("TABLE_NAME")?,
                    child_column: row.try_get("COLUMN_NAME")?,
                    parent_table: row.try_get("REFERENCED_TABLE_NAME")?,
                    parent_column: row.try_get("REFERENCED_COLUMN_NAME")?,
                })
            })
            .collect::<DecodeResult<Vec<_>>>()
            .map_err(|e| MigrateError::source_query(e, "decoding MySQL foreign key graph"))
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<RawColumn>> {
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(1024)) AS COLUMN_TYPE,
                CAST(IS_NULLABLE AS CHAR(3)) AS IS_NULLABLE,
                CAST(COLUMN_KEY AS CHAR(3)) AS COLUMN_KEY,
                CAST(COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
                CAST(EXTRA AS CHAR(255)) AS EXTRA
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let context = format!("describing MySQL table {}", table);
        let rows = self.fetch(query, &self.schema_and_table(table), &context).await?;

        let columns = rows
            .iter()
            .map(|row| -> DecodeResult<RawColumn> {
                Ok(RawColumn {
                    name: row.try_get("COLUMN_NAME")?,
                    column_type: row.try_get("COLUMN_TYPE")?,
                    nullable: row.try_get::<String, _>("IS_NULLABLE")?.eq_ignore_ascii_case("YES"),
                    key: row.try_get("COLUMN_KEY")?,
                    default: catalog_default(row.try_get("COLUMN_DEFAULT")?, self.mariadb),
                    extra: row.try_get("EXTRA")?,
                })
            })
            .collect::<DecodeResult<Vec<_>>>()
            .map_err(|e| MigrateError::source_query(e, context.as_str()))?;

        debug!("Loaded {} columns for {}", columns.len(), table);
        Ok(columns)
    }

    async fn foreign_keys(&self, table: &str) -> Result<Vec<RawForeignKey>> {
        let query = r#"
            SELECT
                CAST(kcu.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME,
                CAST(rc.UPDATE_RULE AS CHAR(32)) AS UPDATE_RULE,
                CAST(rc.DELETE_RULE AS CHAR(32)) AS DELETE_RULE
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            LEFT JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE kcu.TABLE_SCHEMA = ? AND kcu.TABLE_NAME = ?
              AND kcu.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let context = format!("loading MySQL foreign keys for {}", table);
        let rows = self.fetch(query, &self.schema_and_table(table), &context).await?;

        let fks = rows
            .iter()
            .map(|row| -> DecodeResult<RawForeignKey> {
                Ok(RawForeignKey {
                    constraint_name: row.try_get("CONSTRAINT_NAME")?,
                    column: row.try_get("COLUMN_NAME")?,
                    referenced_table: row.try_get("REFERENCED_TABLE_NAME")?,
                    referenced_column: row.try_get("REFERENCED_COLUMN_NAME")?,
                    update_rule: row.try_get("UPDATE_RULE")?,
                    delete_rule: row.try_get("DELETE_RULE")?,
                })
            })
            .collect::<DecodeResult<Vec<_>>>()
            .map_err(|e| MigrateError::source_query(e, context.as_str()))?;

        debug!("Loaded {} foreign key columns for {}", fks.len(), table);
        Ok(fks)
    }

    async fn index_rows(&self, table: &str) -> Result<Vec<RawIndexRow>> {
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(NON_UNIQUE AS SIGNED) AS NON_UNIQUE,
                CAST(INDEX_TYPE AS CHAR(32)) AS INDEX_TYPE
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let context = format!("loading MySQL indexes for {}", table);
        let rows = self.fetch(query, &self.schema_and_table(table), &context).await?;

        let indexes = rows
            .iter()
            .map(|row| -> DecodeResult<RawIndexRow> {
                Ok(RawIndexRow {
                    index_name: row.try_get("INDEX_NAME")?,
                    column: row.try_get("COLUMN_NAME")?,
                    non_unique: row.try_get::<i64, _>("NON_UNIQUE")? != 0,
                    index_type: row.try_get("INDEX_TYPE")?,
                })
            })
            .collect::<DecodeResult<Vec<_>>>()
            .map_err(|e| MigrateError::source_query(e, context.as_str()))?;

        debug!("Loaded {} index rows for {}", indexes.len(), table);
        Ok(indexes)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut q = QueryBuilder::new(MysqlDialect);
        q.push("SELECT CAST(COUNT(*) AS SIGNED) FROM ")
            .push_ident(&Ident::new(table)?);
        let stmt = q.build();

        let context = format!("counting rows in {}", table);
        let rows = self.fetch(stmt.sql(), stmt.params(), &context).await?;
        match rows.first() {
            Some(row) => row
                .try_get::<i64, _>(0)
                .map_err(|e| MigrateError::source_query(e, context.as_str())),
            None => Ok(0),
        }
    }

    async fn read_rows(&self, table: &TableDescriptor, offset: u64, limit: usize) -> Result<Batch> {
        let stmt = select_page(table, offset, limit)?;
        let projections: Vec<Projection> = table
            .columns
            .iter()
            .map(Projection::for_column)
            .collect();

        let context = format!("reading {} at offset {}", table.source_name, offset);
        let rows = self.fetch(stmt.sql(), stmt.params(), &context).await?;

        let decoded = rows
            .iter()
            .map(|row| Self::decode_row(row, &projections))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MigrateError::source_query(e, context.as_str()))?;

        debug!(
            "Read {} rows from {} at offset {}",
            decoded.len(),
            table.source_name,
            offset
        );
        Ok(Batch::new(offset, decoded))
    }

    async fn ping(&self) -> Result<()> {
        self.fetch("SELECT 1", &[], "pinging MySQL source").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
