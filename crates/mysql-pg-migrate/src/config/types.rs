//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::IdentifierCase;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    #[serde(default)]
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    #[serde(default)]
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source database (MySQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// SSL mode: disabled, preferred, required (default: "preferred").
    #[serde(default = "default_mysql_ssl_mode")]
    pub ssl_mode: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_mysql_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            ssl_mode: default_mysql_ssl_mode(),
        }
    }
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode: disable, prefer, require, verify-ca, verify-full (default: "prefer").
    #[serde(default = "default_pg_ssl_mode")]
    pub ssl_mode: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_public_schema(),
            ssl_mode: default_pg_ssl_mode(),
        }
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per source read and bulk insert (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Identifier casing on the target (default: lower).
    #[serde(default)]
    pub identifier_case: IdentifierCase,

    /// Create secondary indexes and unique constraints (default: true).
    #[serde(default = "default_true")]
    pub create_indexes: bool,

    /// Add foreign keys (default: true).
    #[serde(default = "default_true")]
    pub create_foreign_keys: bool,

    /// Count orphaned foreign key references after migration (default: true).
    #[serde(default = "default_true")]
    pub check_orphans: bool,

    /// Attempts for connections and source reads (default: 3).
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Fixed delay between attempts in milliseconds (default: 1000).
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Source pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            identifier_case: IdentifierCase::default(),
            create_indexes: true,
            create_foreign_keys: true,
            check_orphans: true,
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_mysql_ssl_mode() -> String {
    "preferred".to_string()
}

fn default_pg_ssl_mode() -> String {
    "prefer".to_string()
}

fn default_batch_size() -> usize {
    1000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_max_connections() -> u32 {
    4
}

fn default_true() -> bool {
    true
}
