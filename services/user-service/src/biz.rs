//! User use cases and the repository contract the data layer implements

use std::future::Future;

use anyhow::Context;
use pagewise::{
    handlers::ApiError,
    page::Page,
    repository::{RepositoryError, RepositoryResult},
    transaction::{in_tx, DataContext, TxBegin, TxControl},
};
use serde::Serialize;
use validator::Validate;

/// A user as the business layer sees it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Validate)]
pub struct UcUser {
    pub id: u64,
    #[validate(length(min = 1, max = 20))]
    pub name: String,
    pub serial_number: i64,
}

/// Filters and paging of a user listing
#[derive(Debug, Clone, Default)]
pub struct ListCondition {
    pub page: Page,
    /// Exact id, ignored when 0
    pub id: u64,
    /// Substring of the name, ignored when empty
    pub name: String,
}

/// Store operations on users.
///
/// Every call takes the [`DataContext`] so that calls made inside
/// [`in_tx`] share its transaction.
pub trait UserRepo: Send + Sync + 'static {
    type Tx: TxControl;

    fn create(
        &self,
        ctx: &DataContext<Self::Tx>,
        user: &UcUser,
    ) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// Concurrent lookups of the same id share one store read; lookups
    /// inside a transaction always read through it
    fn get_by_id(
        &self,
        ctx: &DataContext<Self::Tx>,
        id: u64,
    ) -> impl Future<Output = RepositoryResult<UcUser>> + Send;

    fn count(&self, ctx: &DataContext<Self::Tx>) -> impl Future<Output = RepositoryResult<i64>> + Send;

    fn max_id(&self, ctx: &DataContext<Self::Tx>) -> impl Future<Output = RepositoryResult<u64>> + Send;

    fn save_serial_number(
        &self,
        ctx: &DataContext<Self::Tx>,
        user: &UcUser,
    ) -> impl Future<Output = RepositoryResult<()>> + Send;

    /// One page of users, newest first; `condition.page` is updated in place
    fn list(
        &self,
        ctx: &DataContext<Self::Tx>,
        condition: &mut ListCondition,
    ) -> impl Future<Output = RepositoryResult<Vec<UcUser>>> + Send;
}

pub struct UserUseCase<R, B> {
    repo: R,
    tm: B,
}

impl<R, B> UserUseCase<R, B>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    pub fn new(repo: R, tm: B) -> Self {
        Self { repo, tm }
    }

    /// The user with `id`; ids below 1 yield an empty user
    pub async fn get(&self, ctx: &DataContext<R::Tx>, id: u64) -> anyhow::Result<UcUser> {
        if id < 1 {
            return Ok(UcUser::default());
        }
        match self.repo.get_by_id(ctx, id).await {
            Ok(user) => Ok(user),
            Err(err) if err.is_not_found() => Err(ApiError::data_not_found().with_cause(err).into()),
            Err(err) => Err(anyhow::Error::new(err).context(format!("get user {id}"))),
        }
    }

    pub async fn add(&self, ctx: &DataContext<R::Tx>, user: &UcUser) -> anyhow::Result<()> {
        user.validate()
            .map_err(|e| ApiError::params(e.to_string()))?;
        self.repo.create(ctx, user).await.context("create user")?;
        Ok(())
    }

    /// Stores the current user count as the serial number of the newest user
    pub async fn tran(&self, ctx: &DataContext<R::Tx>) -> anyhow::Result<()> {
        let repo = &self.repo;
        in_tx(&self.tm, ctx, |tx| async move {
            let count = repo.count(&tx).await?;
            let max_id = repo.max_id(&tx).await?;
            repo.save_serial_number(
                &tx,
                &UcUser {
                    id: max_id,
                    serial_number: count,
                    ..UcUser::default()
                },
            )
            .await?;
            Ok::<_, RepositoryError>(())
        })
        .await
        .context("update serial number")?;
        Ok(())
    }

    pub async fn list(
        &self,
        ctx: &DataContext<R::Tx>,
        condition: &mut ListCondition,
    ) -> anyhow::Result<Vec<UcUser>> {
        let users = self
            .repo
            .list(ctx, condition)
            .await
            .context("list users")?;
        Ok(users)
    }
}
