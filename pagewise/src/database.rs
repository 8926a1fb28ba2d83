//! PostgreSQL pool creation and context-aware connection access

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres};
use tokio::sync::OwnedMutexGuard;

use crate::{
    cache::RedisPool,
    config::DatabaseConfig,
    error::{sanitize_url, DatabaseError, Error, Result},
    transaction::{DataContext, PgTx},
};

/// Create a PostgreSQL connection pool, retrying with exponential backoff
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                tracing::info!(
                    attempts = attempt + 1,
                    max_connections = config.max_connections,
                    min_connections = config.min_connections,
                    "database connection pool created"
                );
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to database after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    "Database connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

async fn try_create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| {
            Error::Database(
                DatabaseError::from(e).add_context(format!("url: {}", sanitize_url(&config.url))),
            )
        })
}

/// Shared handle to the stores
///
/// Repositories hold a `Data` and obtain connections through
/// [`Data::db`], which honours the transaction carried by a context.
/// A Redis pool can be attached for repositories that cache.
#[derive(Clone)]
pub struct Data {
    pool: PgPool,
    rdb: Option<RedisPool>,
}

impl Data {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, rdb: None }
    }

    #[must_use]
    pub fn with_redis(mut self, rdb: RedisPool) -> Self {
        self.rdb = Some(rdb);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The Redis pool, when one was attached
    pub fn rdb(&self) -> Option<&RedisPool> {
        self.rdb.as_ref()
    }

    /// The context's transaction if it has one, else a pooled connection.
    ///
    /// Holding the returned [`Conn`] blocks other calls on the same
    /// transaction until it is dropped.
    pub async fn db(&self, ctx: &DataContext) -> std::result::Result<Conn, DatabaseError> {
        match ctx.transaction() {
            Some(tx) => Ok(Conn::Tx(tx.clone().lock_owned().await)),
            None => Ok(Conn::Pooled(self.pool.acquire().await?)),
        }
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("pool", &self.pool)
            .field("redis", &self.rdb.is_some())
            .finish()
    }
}

/// A connection obtained through [`Data::db`]
pub enum Conn {
    Pooled(PoolConnection<Postgres>),
    Tx(OwnedMutexGuard<PgTx>),
}

impl Deref for Conn {
    type Target = PgConnection;

    fn deref(&self) -> &PgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Tx(tx) => tx,
        }
    }
}

impl DerefMut for Conn {
    fn deref_mut(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => conn,
            Self::Tx(tx) => tx,
        }
    }
}
