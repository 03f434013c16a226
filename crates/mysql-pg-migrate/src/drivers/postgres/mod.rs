//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PostgresSession`]: Transactional target session on one pooled connection
//! - [`value`]: Binding of migrated values to PostgreSQL column types

mod dialect;
mod session;
pub mod value;

pub use dialect::PostgresDialect;
pub use session::PostgresSession;
