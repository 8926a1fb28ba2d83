//! PostgreSQL implementation of [`UserRepo`]

use pagewise::{
    database::Data,
    dedup::{dedup_key, Singleflight},
    page::{FilterCondition, OrderDirection, PgFind, Select},
    repository::{RepositoryError, RepositoryOperation, RepositoryResult},
    transaction::{DataContext, PgTx},
};

use crate::{
    biz::{ListCondition, UcUser, UserRepo},
    model::{UcUserRow, TABLE},
};

const SELECT_BY_ID: &str = "SELECT id, is_del, created_at, updated_at, name, serial_number \
                            FROM uc_users WHERE id = $1";

pub struct PgUserRepo {
    data: Data,
    in_flight: Singleflight<String, RepositoryResult<UcUser>>,
}

impl PgUserRepo {
    pub fn new(data: Data) -> Self {
        Self {
            data,
            in_flight: Singleflight::new(),
        }
    }

    async fn fetch_by_id(&self, ctx: &DataContext, id: u64) -> RepositoryResult<UcUser> {
        let not_found = || RepositoryError::not_found("UcUser", id.to_string());
        let key = i64::try_from(id).map_err(|_| not_found())?;

        let mut conn = self.data.db(ctx).await?;
        let row: Option<UcUserRow> = sqlx::query_as(SELECT_BY_ID)
            .bind(key)
            .fetch_optional(&mut *conn)
            .await?;
        row.map(UcUserRow::into_domain).ok_or_else(not_found)
    }
}

/// The listing select for `condition`, newest first
pub fn list_select(condition: &ListCondition) -> Select {
    let mut select = Select::table(TABLE).order_by("id", OrderDirection::Descending);
    if condition.id > 0 {
        select = select.filter(FilterCondition::eq(
            "id",
            i64::try_from(condition.id).unwrap_or(i64::MAX),
        ));
    }
    if !condition.name.is_empty() {
        select = select.filter(FilterCondition::contains("name", &condition.name));
    }
    select
}

impl UserRepo for PgUserRepo {
    type Tx = PgTx;

    async fn create(&self, ctx: &DataContext, user: &UcUser) -> RepositoryResult<()> {
        let mut conn = self.data.db(ctx).await?;
        sqlx::query("INSERT INTO uc_users (name) VALUES ($1)")
            .bind(&user.name)
            .execute(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Create))?;
        Ok(())
    }

    async fn get_by_id(&self, ctx: &DataContext, id: u64) -> RepositoryResult<UcUser> {
        if ctx.in_transaction() {
            return self.fetch_by_id(ctx, id).await;
        }
        let (result, shared) = self
            .in_flight
            .run(dedup_key("GetUcUserById", id), || self.fetch_by_id(ctx, id))
            .await;
        if shared {
            tracing::debug!(id, "shared in-flight user lookup");
        }
        result
    }

    async fn count(&self, ctx: &DataContext) -> RepositoryResult<i64> {
        let mut conn = self.data.db(ctx).await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM uc_users")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Count))?;
        Ok(total)
    }

    async fn max_id(&self, ctx: &DataContext) -> RepositoryResult<u64> {
        let mut conn = self.data.db(ctx).await?;
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM uc_users ORDER BY id DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await?;
        id.and_then(|id| u64::try_from(id).ok())
            .ok_or_else(|| RepositoryError::not_found("UcUser", "max id"))
    }

    async fn save_serial_number(&self, ctx: &DataContext, user: &UcUser) -> RepositoryResult<()> {
        let id = i64::try_from(user.id)
            .map_err(|_| RepositoryError::not_found("UcUser", user.id.to_string()))?;
        let mut conn = self.data.db(ctx).await?;
        sqlx::query("UPDATE uc_users SET serial_number = $1, updated_at = now() WHERE id = $2")
            .bind(user.serial_number)
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| RepositoryError::from(e).with_operation(RepositoryOperation::Update))?;
        Ok(())
    }

    async fn list(
        &self,
        ctx: &DataContext,
        condition: &mut ListCondition,
    ) -> RepositoryResult<Vec<UcUser>> {
        let select = list_select(condition);
        let mut conn = self.data.db(ctx).await?;
        let rows = condition
            .page
            .query(PgFind::<UcUserRow>::new(&mut *conn, select))
            .find()
            .await?;
        Ok(rows.into_iter().map(UcUserRow::into_domain).collect())
    }
}
