//! Configuration validation.
//!
//! Every failure is a [`MigrateError::Validation`] raised before any
//! connection is opened.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};

const MYSQL_SSL_MODES: &[&str] = &["disabled", "preferred", "required", "verify_ca", "verify_identity"];
const PG_SSL_MODES: &[&str] = &["disable", "prefer", "require", "verify-ca", "verify-full"];

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(MigrateError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn require_port(port: u16, field: &str) -> Result<()> {
    if port == 0 {
        return Err(MigrateError::Validation(format!(
            "{} must be between 1 and 65535",
            field
        )));
    }
    Ok(())
}

/// Parse a port from text, enforcing the 1..=65535 range.
pub fn parse_port(raw: &str, field: &str) -> Result<u16> {
    let value: u32 = raw.trim().parse().map_err(|_| {
        MigrateError::Validation(format!("{} must be a number, got '{}'", field, raw))
    })?;
    match u16::try_from(value) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(MigrateError::Validation(format!(
            "{} must be between 1 and 65535, got {}",
            field, value
        ))),
    }
}

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    require(&config.source.host, "source.host")?;
    require_port(config.source.port, "source.port")?;
    require(&config.source.user, "source.user")?;
    require(&config.source.password, "source.password")?;
    require(&config.source.database, "source.database")?;
    if !MYSQL_SSL_MODES.contains(&config.source.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Validation(format!(
            "source.ssl_mode must be one of {}, got '{}'",
            MYSQL_SSL_MODES.join(", "),
            config.source.ssl_mode
        )));
    }

    // Target validation
    require(&config.target.host, "target.host")?;
    require_port(config.target.port, "target.port")?;
    require(&config.target.user, "target.user")?;
    require(&config.target.password, "target.password")?;
    require(&config.target.database, "target.database")?;
    validate_identifier(&config.target.schema)
        .map_err(|e| MigrateError::Validation(format!("target.schema: {}", e)))?;
    if !PG_SSL_MODES.contains(&config.target.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Validation(format!(
            "target.ssl_mode must be one of {}, got '{}'",
            PG_SSL_MODES.join(", "),
            config.target.ssl_mode
        )));
    }

    // Migration config validation
    if config.migration.batch_size == 0 {
        return Err(MigrateError::Validation(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if config.migration.connect_attempts == 0 {
        return Err(MigrateError::Validation(
            "migration.connect_attempts must be at least 1".into(),
        ));
    }
    if config.migration.max_connections == 0 {
        return Err(MigrateError::Validation(
            "migration.max_connections must be at least 1".into(),
        ));
    }

    Ok(())
}
