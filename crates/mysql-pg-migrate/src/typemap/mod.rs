//! Type catalog: MySQL base type tokens to PostgreSQL type names.

/// Target type used for any base type the catalog does not know.
pub const FALLBACK_TYPE: &str = "TEXT";

/// Static lookup from MySQL base type tokens to PostgreSQL type names.
///
/// Works on the bare token (`varchar`, not `varchar(255)`); sizing and
/// auto-increment handling belong to the schema translator.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeCatalog;

impl TypeCatalog {
    /// Look up a base type token, case-insensitively.
    pub fn lookup(base_type: &str) -> Option<&'static str> {
        let mapped = match base_type.to_lowercase().as_str() {
            // Integer types
            "int" | "integer" | "mediumint" => "INTEGER",
            "bigint" => "BIGINT",
            "smallint" | "tinyint" => "SMALLINT",
            "year" => "INTEGER",

            // Boolean
            "bit" | "bool" | "boolean" => "BOOLEAN",

            // Decimal/numeric
            "decimal" | "numeric" | "dec" | "fixed" => "NUMERIC",

            // Floating point
            "float" => "REAL",
            "double" | "real" => "DOUBLE PRECISION",

            // String types
            "varchar" => "VARCHAR",
            "char" => "CHAR",
            "text" | "tinytext" | "mediumtext" | "longtext" => "TEXT",
            "enum" | "set" => "TEXT",

            // Date/time types
            "datetime" | "timestamp" => "TIMESTAMP",
            "date" => "DATE",
            "time" => "TIME",

            // Documents
            "json" => "JSONB",

            // Binary types
            "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => "BYTEA",

            // Spatial types (carried as WKT text)
            "geometry" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" => "TEXT",

            _ => return None,
        };
        Some(mapped)
    }

    /// Map a base type token, falling back to [`FALLBACK_TYPE`].
    pub fn map(base_type: &str) -> &'static str {
        Self::lookup(base_type).unwrap_or(FALLBACK_TYPE)
    }

    /// Whether the base type carries a size or precision onto the target.
    pub fn is_sized(base_type: &str) -> bool {
        matches!(
            base_type.to_lowercase().as_str(),
            "varchar" | "char" | "decimal" | "numeric" | "dec" | "fixed"
        )
    }

    /// Whether the base type belongs to the temporal family.
    pub fn is_temporal(base_type: &str) -> bool {
        matches!(
            base_type.to_lowercase().as_str(),
            "date" | "datetime" | "timestamp" | "time"
        )
    }
}
