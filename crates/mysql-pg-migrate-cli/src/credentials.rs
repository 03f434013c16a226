//! Connection parameters from flags and the environment.
//!
//! Precedence is flag, then environment variable, then the YAML file. clap
//! resolves the first two; [`CredentialArgs::apply`] lays the result over the
//! loaded file.

use clap::Args;
use mysql_pg_migrate::config::parse_port;
use mysql_pg_migrate::{Config, Result};

#[derive(Args, Debug, Default, Clone)]
pub struct CredentialArgs {
    /// MySQL host
    #[arg(long, env = "MYSQL_HOST")]
    pub mysql_host: Option<String>,

    /// MySQL port
    #[arg(long, env = "MYSQL_PORT")]
    pub mysql_port: Option<String>,

    /// MySQL user
    #[arg(long, env = "MYSQL_USER")]
    pub mysql_user: Option<String>,

    /// MySQL password
    #[arg(long, env = "MYSQL_PASSWORD", hide_env_values = true)]
    pub mysql_password: Option<String>,

    /// MySQL database to migrate
    #[arg(long, env = "MYSQL_DATABASE")]
    pub mysql_database: Option<String>,

    /// PostgreSQL host
    #[arg(long, env = "POSTGRES_HOST")]
    pub postgres_host: Option<String>,

    /// PostgreSQL port
    #[arg(long, env = "POSTGRES_PORT")]
    pub postgres_port: Option<String>,

    /// PostgreSQL user
    #[arg(long, env = "POSTGRES_USER")]
    pub postgres_user: Option<String>,

    /// PostgreSQL password
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub postgres_password: Option<String>,

    /// PostgreSQL database to migrate into
    #[arg(long, env = "POSTGRES_DATABASE")]
    pub postgres_database: Option<String>,

    /// Target schema
    #[arg(long)]
    pub target_schema: Option<String>,
}

fn overlay(slot: &mut String, value: &Option<String>) {
    if let Some(v) = value {
        *slot = v.clone();
    }
}

impl CredentialArgs {
    /// Overwrite config fields with every value given on the command line or
    /// in the environment.
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        let source = &mut config.source;
        overlay(&mut source.host, &self.mysql_host);
        overlay(&mut source.user, &self.mysql_user);
        overlay(&mut source.password, &self.mysql_password);
        overlay(&mut source.database, &self.mysql_database);
        if let Some(port) = &self.mysql_port {
            source.port = parse_port(port, "MYSQL_PORT")?;
        }

        let target = &mut config.target;
        overlay(&mut target.host, &self.postgres_host);
        overlay(&mut target.user, &self.postgres_user);
        overlay(&mut target.password, &self.postgres_password);
        overlay(&mut target.database, &self.postgres_database);
        overlay(&mut target.schema, &self.target_schema);
        if let Some(port) = &self.postgres_port {
            target.port = parse_port(port, "POSTGRES_PORT")?;
        }

        Ok(())
    }
}
