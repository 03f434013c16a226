//! PostgreSQL target session.
//!
//! One pooled connection carries the whole migration transaction. Transaction
//! control goes through the simple query protocol; data statements go through
//! the extended protocol with [`SqlValue`] parameters.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::query::Statement;
use crate::core::traits::TargetSession;
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};
use crate::retry::RetryPolicy;

/// Connect timeout for the target.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL implementation of [`TargetSession`].
pub struct PostgresSession {
    pool: Pool,
    client: Option<Object>,
    endpoint: String,
    in_transaction: bool,
}

impl PostgresSession {
    /// Connect to the target, retrying transient failures.
    pub async fn connect(config: &TargetConfig, retry: RetryPolicy) -> Result<Self> {
        let endpoint = config.endpoint();
        let tls = TlsBuilder::parse(&config.ssl_mode)?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.ssl_mode(tls.ssl_mode().pg_ssl_mode());
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = match tls.build()? {
            Some(connector) => Manager::from_config(pg_config, connector, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::Config(format!("creating PostgreSQL pool: {}", e)))?;

        let client = retry
            .run("connecting to PostgreSQL target", || async {
                let client = pool
                    .get()
                    .await
                    .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
                client
                    .simple_query("SELECT 1")
                    .await
                    .map_err(|e| MigrateError::connection(endpoint.as_str(), e))?;
                Ok(client)
            })
            .await?;

        info!("Connected to PostgreSQL target: {}", endpoint);

        Ok(Self {
            pool,
            client: Some(client),
            endpoint,
            in_transaction: false,
        })
    }

    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::connection(self.endpoint.as_str(), "session is closed"))
    }

    async fn simple(&self, sql: &str) -> Result<()> {
        debug!("{}", sql);
        self.client()?.batch_execute(sql).await?;
        Ok(())
    }
}

fn params(stmt: &Statement) -> Vec<&(dyn ToSql + Sync)> {
    stmt.params()
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}

#[async_trait]
impl TargetSession for PostgresSession {
    async fn begin(&mut self) -> Result<()> {
        self.simple("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.simple("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.simple("ROLLBACK").await
    }

    async fn savepoint(&mut self, name: &'static str) -> Result<()> {
        self.simple(&format!("SAVEPOINT {}", name)).await
    }

    async fn release_savepoint(&mut self, name: &'static str) -> Result<()> {
        self.simple(&format!("RELEASE SAVEPOINT {}", name)).await
    }

    async fn rollback_to_savepoint(&mut self, name: &'static str) -> Result<()> {
        // Release too, so a reused name never stacks savepoints.
        self.simple(&format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0}",
            name
        ))
        .await
    }

    async fn execute(&mut self, stmt: &Statement) -> Result<u64> {
        let client = self.client()?;
        Ok(client.execute(stmt.sql(), &params(stmt)).await?)
    }

    async fn query_i64(&mut self, stmt: &Statement) -> Result<Option<i64>> {
        let client = self.client()?;
        let rows = client.query(stmt.sql(), &params(stmt)).await?;
        match rows.first() {
            Some(row) => Ok(row.try_get::<_, Option<i64>>(0)?),
            None => Ok(None),
        }
    }

    async fn query_strings(&mut self, stmt: &Statement) -> Result<Vec<String>> {
        let client = self.client()?;
        let rows = client.query(stmt.sql(), &params(stmt)).await?;
        rows.iter()
            .map(|row| row.try_get::<_, String>(0).map_err(MigrateError::from))
            .collect()
    }

    async fn ping(&mut self) -> Result<()> {
        self.client()?.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn close(&mut self) {
        if self.in_transaction {
            if let Err(e) = self.rollback().await {
                warn!("Rollback while closing PostgreSQL session failed: {}", e);
            }
        }
        self.client = None;
        self.pool.close();
    }
}
