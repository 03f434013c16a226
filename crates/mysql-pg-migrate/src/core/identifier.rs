//! Identifier validation, quoting, and case normalization.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed as
//! parameters in prepared statements, only data values can. Every identifier
//! therefore goes through [`Ident::new`] once, at introspection time, and is
//! carried as an [`Ident`] from then on. Dialects quote an `Ident` when it is
//! pushed into a [`QueryBuilder`](super::query::QueryBuilder); nothing else in
//! the crate writes names into SQL text.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes (longer names are truncated by the server)
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Identifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Identifier(format!(
            "identifier contains null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Identifier(format!(
            "identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// A validated SQL identifier.
///
/// Holds the name exactly as it will appear on the target (after case
/// normalization). Quoting is the dialect's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ident(String);

impl Ident {
    /// Validate and wrap a name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self(name))
    }

    /// The unquoted name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ident {
    type Error = MigrateError;

    fn try_from(value: String) -> Result<Self> {
        Ident::new(value)
    }
}

impl From<Ident> for String {
    fn from(ident: Ident) -> Self {
        ident.0
    }
}

impl fmt::Display for Ident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How source identifiers are cased on the target.
///
/// Applied exactly once, when descriptors are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierCase {
    /// Fold to lowercase so unquoted PostgreSQL references keep working.
    #[default]
    Lower,
    /// Keep the source spelling.
    Preserve,
}

impl IdentifierCase {
    /// Normalize a source name into a target identifier.
    pub fn apply(&self, source_name: &str) -> Result<Ident> {
        match self {
            IdentifierCase::Lower => Ident::new(source_name.to_lowercase()),
            IdentifierCase::Preserve => Ident::new(source_name),
        }
    }
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
pub fn quote_pg(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL identifier using backticks.
///
/// Escapes backticks by doubling them and wraps in backticks.
pub fn quote_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("Order Items").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_boundary() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let result = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1));
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    // =========================================================================
    // Case policy tests
    // =========================================================================

    #[test]
    fn test_lower_case_policy() {
        let ident = IdentifierCase::Lower.apply("CustomerOrders").unwrap();
        assert_eq!(ident.as_str(), "customerorders");
    }

    #[test]
    fn test_preserve_case_policy() {
        let ident = IdentifierCase::Preserve.apply("CustomerOrders").unwrap();
        assert_eq!(ident.as_str(), "CustomerOrders");
    }

    #[test]
    fn test_case_policy_still_validates() {
        assert!(IdentifierCase::Lower.apply("").is_err());
    }

    #[test]
    fn test_ident_deserialize_validates() {
        let ok: Ident = serde_json::from_str("\"public\"").unwrap();
        assert_eq!(ok.as_str(), "public");
        assert!(serde_json::from_str::<Ident>("\"\"").is_err());
    }

    // =========================================================================
    // Quoting tests
    // =========================================================================

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users"), "\"users\"");
        assert_eq!(quote_pg("table\"name"), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        assert_eq!(
            quote_pg("Robert\"); DROP TABLE Students;--"),
            "\"Robert\"\"); DROP TABLE Students;--\""
        );
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("users"), "`users`");
        assert_eq!(quote_mysql("table`name"), "`table``name`");
    }
}
