//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;
pub use validation::parse_port;

use std::path::Path;

use crate::core::Ident;
use crate::error::Result;

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Read a YAML file without validating it.
    ///
    /// Used when later layers (flags, environment) still fill in fields.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string without validating it.
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// The target schema as a validated identifier.
    pub fn target_schema(&self) -> Result<Ident> {
        Ident::new(self.target.schema.clone())
    }
}

impl SourceConfig {
    /// Human-readable endpoint for logs and errors (no credentials).
    pub fn endpoint(&self) -> String {
        format!("mysql://{}:{}/{}", self.host, self.port, self.database)
    }
}

impl TargetConfig {
    /// Human-readable endpoint for logs and errors (no credentials).
    pub fn endpoint(&self) -> String {
        format!("postgres://{}:{}/{}", self.host, self.port, self.database)
    }
}
