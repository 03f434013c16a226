//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: SQL syntax strategy for MySQL
//! - [`MysqlReader`]: Source reader over a SQLx connection pool

mod dialect;
mod reader;

pub use dialect::MysqlDialect;
pub use reader::MysqlReader;
