//! # pagewise
//!
//! Request scaffolding for axum + sqlx services.
//!
//! ## Features
//!
//! - **Dispatch**: uniform handlers behind an ordered filter chain, rendered as one
//!   `{code, msg, data}` envelope with a stable error taxonomy
//! - **Pagination**: page normalization plus count, direct and key-join fetch
//!   strategies over PostgreSQL
//! - **Deduplication**: concurrent identical reads collapse into one store call
//! - **Transactions**: scoped transactions threaded through repositories
//! - **Clients**: a Redis pool carried by [`database::Data`] and an outbound HTTP
//!   client for form, JSON and multipart calls
//! - **Ambient stack**: layered configuration, JSON tracing, request ids, graceful shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use pagewise::prelude::*;
//!
//! async fn ping(_rc: RequestContext<()>) -> anyhow::Result<Option<&'static str>> {
//!     Ok(Some("pong"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load_for_service("ping-service")?;
//!     init_tracing(&config)?;
//!
//!     let app = Router::new().route("/ping", get(api("Ping", ping, [])));
//!
//!     Server::new(config).serve(app).await
//! }
//! ```

pub mod cache;
pub mod client;
pub mod config;
pub mod database;
pub mod dedup;
pub mod error;
pub mod handlers;
pub mod ids;
pub mod middleware;
pub mod observability;
pub mod page;
pub mod repository;
pub mod server;
pub mod transaction;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{create_redis_pool, RedisPool};
    pub use crate::client::{ClientError, ClientResponse, HttpClient};
    pub use crate::config::{
        Config, DatabaseConfig, Environment, MiddlewareConfig, RedisConfig, ServiceConfig,
    };
    pub use crate::database::{create_pool, Conn, Data};
    pub use crate::dedup::{dedup_key, Singleflight};
    pub use crate::error::{DatabaseError, DatabaseErrorKind, DatabaseOperation, Error, Result};
    pub use crate::handlers::{
        api, filter_fn, respond, ApiError, Endpoint, Envelope, Filter, LoginUserId, Next,
        PageList, Reason, RequestContext,
    };
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError};
    pub use crate::observability::init_tracing;
    pub use crate::page::{
        FilterCondition, OrderDirection, Page, PageError, PageParams, PgFind, PgScan, Select,
    };
    pub use crate::repository::{
        RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
    };
    pub use crate::server::Server;
    pub use crate::transaction::{in_tx, DataContext, PgTx, TxBegin, TxControl};

    pub use axum::{
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::{get, post},
        Router,
    };

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, warn};

    pub use tokio;

    pub use anyhow::{self, Context as AnyhowContext};
}
