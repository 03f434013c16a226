//! Core abstractions for the migration engine.
//!
//! - [`schema`]: Raw catalog rows and normalized table descriptors
//! - [`value`]: Column values moved from source to target
//! - [`identifier`]: Identifier validation, quoting, and case policy
//! - [`query`]: Statement builder separating identifiers from values
//! - [`traits`]: Source reader, target session, and dialect seams
//!
//! Core defines the database-agnostic pieces; `drivers/mysql` and
//! `drivers/postgres` implement them.

pub mod identifier;
pub mod query;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::{Ident, IdentifierCase};
pub use query::{QueryBuilder, SqlFragment, Statement};
pub use schema::{
    ColumnDescriptor, ForeignKeyDescriptor, ForeignKeyEdge, IndexDescriptor, RawColumn,
    RawForeignKey, RawIndexRow, ReferentialAction, TableDescriptor, TargetType,
};
pub use traits::{Dialect, SourceReader, TargetSession};
pub use value::{Batch, Row, SqlValue};
