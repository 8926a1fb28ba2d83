//! Scoped transactions threaded through repository calls
//!
//! A [`DataContext`] is passed explicitly to every repository method. Outside
//! a transaction it is empty and repositories use a pooled connection; inside
//! [`in_tx`] it carries the open transaction so every call in the chain runs
//! on it. Nested [`in_tx`] calls reuse the ambient transaction, so at most one
//! is open per call chain.

use std::future::Future;
use std::sync::Arc;

use sqlx::{PgPool, Postgres};
use tokio::sync::Mutex;

use crate::error::DatabaseError;

/// The PostgreSQL transaction type carried by a [`DataContext`]
pub type PgTx = sqlx::Transaction<'static, Postgres>;

/// Ambient data-access context: empty, or bound to one open transaction
pub struct DataContext<Tx = PgTx> {
    tx: Option<Arc<Mutex<Tx>>>,
}

impl<Tx> DataContext<Tx> {
    /// A context outside any transaction
    pub fn new() -> Self {
        Self { tx: None }
    }

    pub fn transaction(&self) -> Option<&Arc<Mutex<Tx>>> {
        self.tx.as_ref()
    }

    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }
}

impl<Tx> Default for DataContext<Tx> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tx> Clone for DataContext<Tx> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<Tx> std::fmt::Debug for DataContext<Tx> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataContext")
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

/// Finishes an open transaction
pub trait TxControl: Send + 'static {
    fn commit(self) -> impl Future<Output = Result<(), DatabaseError>> + Send;
    fn rollback(self) -> impl Future<Output = Result<(), DatabaseError>> + Send;
}

/// Opens transactions
pub trait TxBegin: Send + Sync {
    type Tx: TxControl;

    fn begin(&self) -> impl Future<Output = Result<Self::Tx, DatabaseError>> + Send;
}

impl TxBegin for PgPool {
    type Tx = PgTx;

    async fn begin(&self) -> Result<PgTx, DatabaseError> {
        sqlx::Pool::begin(self)
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("begin: {e}")))
    }
}

impl TxControl for PgTx {
    async fn commit(self) -> Result<(), DatabaseError> {
        sqlx::Transaction::commit(self)
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("commit: {e}")))
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        sqlx::Transaction::rollback(self)
            .await
            .map_err(|e| DatabaseError::transaction_failed(format!("rollback: {e}")))
    }
}

/// Runs `f` inside a transaction.
///
/// If `ctx` already carries a transaction, `f` joins it and nothing is
/// committed here. Otherwise a transaction is opened, `f` receives a context
/// bound to it, and the transaction is committed when `f` returns `Ok` and
/// rolled back when it returns `Err`. A panic in `f` drops the transaction,
/// which rolls it back.
pub async fn in_tx<B, F, Fut, T, E>(backend: &B, ctx: &DataContext<B::Tx>, f: F) -> Result<T, E>
where
    B: TxBegin,
    F: FnOnce(DataContext<B::Tx>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<DatabaseError>,
{
    if ctx.in_transaction() {
        return f(ctx.clone()).await;
    }

    let shared = Arc::new(Mutex::new(backend.begin().await?));
    let scoped = DataContext {
        tx: Some(shared.clone()),
    };
    let result = f(scoped).await;

    let tx = match Arc::try_unwrap(shared) {
        Ok(tx) => tx.into_inner(),
        Err(_) => {
            tracing::error!("transaction context escaped its scope; abandoning transaction");
            return match result {
                Ok(_) => Err(DatabaseError::transaction_failed(
                    "transaction context escaped its scope",
                )
                .into()),
                Err(err) => Err(err),
            };
        }
    };

    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::error!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
