//! Database driver implementations.
//!
//! - [`mysql`]: MySQL/MariaDB source reader and dialect
//! - [`postgres`]: PostgreSQL target session, dialect, and value binding
//! - [`common`]: Shared utilities (TLS)

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlDialect, MysqlReader};
pub use postgres::{PostgresDialect, PostgresSession};
