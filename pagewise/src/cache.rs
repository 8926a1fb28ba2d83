//! Redis connection pool management

use std::fmt::Display;
use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};

use crate::{
    config::RedisConfig,
    error::{sanitize_url, Error, Result},
};

/// Pooled Redis connections
pub type RedisPool = Pool;

/// Create a Redis pool and check it answers `PING`, retrying with
/// exponential backoff
pub async fn create_redis_pool(config: &RedisConfig) -> Result<RedisPool> {
    let mut attempt = 0;
    let base_delay = Duration::from_secs(config.retry_delay_secs);

    loop {
        match try_create_pool(config).await {
            Ok(pool) => {
                tracing::info!(
                    attempts = attempt + 1,
                    max_connections = config.max_connections,
                    "redis connection pool created"
                );
                return Ok(pool);
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.max_retries {
                    tracing::error!(
                        "Failed to connect to Redis after {} attempts: {}",
                        config.max_retries + 1,
                        e
                    );
                    return Err(e);
                }

                let delay = base_delay * 2_u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    "Redis connection attempt {} failed: {}. Retrying in {:?}...",
                    attempt,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Builds the pool without opening a connection
pub fn build_redis_pool(config: &RedisConfig) -> Result<RedisPool> {
    let timeout = config.connection_timeout();
    PoolConfig::from_url(config.url.clone())
        .builder()
        .map_err(|e| redis_error(config, e))?
        .max_size(config.max_connections)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| redis_error(config, e))
}

async fn try_create_pool(config: &RedisConfig) -> Result<RedisPool> {
    let pool = build_redis_pool(config)?;
    let mut conn = pool.get().await.map_err(|e| redis_error(config, e))?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| redis_error(config, e))?;
    drop(conn);
    Ok(pool)
}

fn redis_error(config: &RedisConfig, err: impl Display) -> Error {
    Error::Redis(format!("{err} [url: {}]", sanitize_url(&config.url)))
}
