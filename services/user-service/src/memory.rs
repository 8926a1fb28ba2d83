//! In-memory user store for tests

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use pagewise::{
    dedup::{dedup_key, Singleflight},
    error::DatabaseError,
    page::{FetchPlan, PageError, PageSource, Strategy},
    repository::{RepositoryError, RepositoryOperation, RepositoryResult},
    transaction::{DataContext, TxBegin, TxControl},
};

use crate::biz::{ListCondition, UcUser, UserRepo};

#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Vec<UcUser>>>,
    reads: Arc<AtomicUsize>,
    transactions: Arc<AtomicUsize>,
    fail_saves: bool,
    in_flight: Arc<Singleflight<String, RepositoryResult<UcUser>>>,
}

pub struct MemoryTx {
    staged: Vec<UcUser>,
    store: MemoryStore,
}

impl MemoryStore {
    pub fn with_users(names: &[&str]) -> Self {
        let store = Self::default();
        {
            let mut rows = store.rows.lock().unwrap();
            for (i, name) in names.iter().enumerate() {
                rows.push(UcUser {
                    id: i as u64 + 1,
                    name: name.to_string(),
                    serial_number: 0,
                });
            }
        }
        store
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Committed rows
    pub fn users(&self) -> Vec<UcUser> {
        self.rows.lock().unwrap().clone()
    }

    /// Store reads performed by `get_by_id`
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn transactions(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    async fn with_rows<T, F>(&self, ctx: &DataContext<MemoryTx>, f: F) -> T
    where
        F: FnOnce(&mut Vec<UcUser>) -> T + Send,
    {
        match ctx.transaction() {
            Some(tx) => {
                let mut tx = tx.lock().await;
                f(&mut tx.staged)
            }
            None => {
                let mut rows = self.rows.lock().unwrap();
                f(&mut rows)
            }
        }
    }
}

impl MemoryStore {
    async fn fetch_by_id(&self, ctx: &DataContext<MemoryTx>, id: u64) -> RepositoryResult<UcUser> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.with_rows(ctx, |rows| rows.iter().find(|u| u.id == id).cloned())
            .await
            .ok_or_else(|| RepositoryError::not_found("UcUser", id.to_string()))
    }
}

impl TxBegin for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, DatabaseError> {
        self.transactions.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryTx {
            staged: self.users(),
            store: self.clone(),
        })
    }
}

impl TxControl for MemoryTx {
    async fn commit(self) -> Result<(), DatabaseError> {
        *self.store.rows.lock().unwrap() = self.staged;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Rows already filtered and ordered, paged by the engine
struct VecSource(Vec<UcUser>);

impl PageSource for VecSource {
    type Row = UcUser;

    fn has_order(&self) -> bool {
        true
    }

    async fn count(&mut self) -> Result<i64, PageError> {
        Ok(self.0.len() as i64)
    }

    async fn rows(&mut self, plan: &FetchPlan) -> Result<Vec<UcUser>, PageError> {
        let window = match &plan.strategy {
            Strategy::All => return Ok(self.0.clone()),
            Strategy::Direct(window) | Strategy::KeyJoin { window, .. } => *window,
        };
        Ok(self
            .0
            .iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .cloned()
            .collect())
    }
}

impl UserRepo for MemoryStore {
    type Tx = MemoryTx;

    async fn create(&self, ctx: &DataContext<MemoryTx>, user: &UcUser) -> RepositoryResult<()> {
        let name = user.name.clone();
        self.with_rows(ctx, move |rows| {
            let id = rows.iter().map(|u| u.id).max().unwrap_or(0) + 1;
            rows.push(UcUser {
                id,
                name,
                serial_number: 0,
            });
        })
        .await;
        Ok(())
    }

    async fn get_by_id(&self, ctx: &DataContext<MemoryTx>, id: u64) -> RepositoryResult<UcUser> {
        if ctx.in_transaction() {
            return self.fetch_by_id(ctx, id).await;
        }
        let (result, _) = self
            .in_flight
            .run(dedup_key("GetUcUserById", id), || self.fetch_by_id(ctx, id))
            .await;
        result
    }

    async fn count(&self, ctx: &DataContext<MemoryTx>) -> RepositoryResult<i64> {
        Ok(self.with_rows(ctx, |rows| rows.len() as i64).await)
    }

    async fn max_id(&self, ctx: &DataContext<MemoryTx>) -> RepositoryResult<u64> {
        self.with_rows(ctx, |rows| rows.iter().map(|u| u.id).max())
            .await
            .ok_or_else(|| RepositoryError::not_found("UcUser", "max id"))
    }

    async fn save_serial_number(
        &self,
        ctx: &DataContext<MemoryTx>,
        user: &UcUser,
    ) -> RepositoryResult<()> {
        if self.fail_saves {
            return Err(RepositoryError::database_error(
                RepositoryOperation::Update,
                "serial number column is read-only",
            ));
        }
        let (id, serial) = (user.id, user.serial_number);
        self.with_rows(ctx, move |rows| {
            if let Some(row) = rows.iter_mut().find(|u| u.id == id) {
                row.serial_number = serial;
            }
        })
        .await;
        Ok(())
    }

    async fn list(
        &self,
        ctx: &DataContext<MemoryTx>,
        condition: &mut ListCondition,
    ) -> RepositoryResult<Vec<UcUser>> {
        let (id, name) = (condition.id, condition.name.clone());
        let mut matching = self
            .with_rows(ctx, move |rows| {
                rows.iter()
                    .filter(|u| id == 0 || u.id == id)
                    .filter(|u| name.is_empty() || u.name.contains(&name))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .await;
        matching.sort_by(|a, b| b.id.cmp(&a.id));

        let rows = condition.page.query(VecSource(matching)).find().await?;
        Ok(rows)
    }
}
