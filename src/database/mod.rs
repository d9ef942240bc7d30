pub mod error;
pub mod memory;
pub mod payment_record_repository;
pub mod record_store;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::error::DatabaseError;
use crate::config::DatabaseConfig;

/// Database pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 5,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl PoolConfig {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connection_timeout: Duration::from_secs(config.connection_timeout),
            idle_timeout: config
                .idle_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            max_lifetime: defaults.max_lifetime,
        }
    }
}

/// Initialize the database connection pool and verify a connection can be
/// acquired before the server starts taking traffic.
pub async fn init_pool(
    database_url: &str,
    config: Option<PoolConfig>,
) -> Result<PgPool, DatabaseError> {
    let config = config.unwrap_or_default();

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connection_timeout_secs = config.connection_timeout.as_secs(),
        "initializing database pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connection_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect(database_url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "failed to initialize database pool");
            DatabaseError::from_sqlx(e)
        })?;

    pool.acquire().await.map_err(|e| {
        log_error!(error = %e, "failed to acquire test connection");
        DatabaseError::from_sqlx(e)
    })?;

    info!("database pool initialized");
    Ok(pool)
}

/// Connection pool health check
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1").fetch_one(pool).await.map_err(|e| {
        warn!(error = %e, "database health check failed");
        DatabaseError::from_sqlx(e)
    })?;
    Ok(())
}
