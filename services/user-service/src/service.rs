//! HTTP handlers of the user endpoints

use std::sync::Arc;

use pagewise::{
    handlers::{PageList, RequestContext},
    page::Page,
    transaction::{DataContext, TxBegin},
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::biz::{ListCondition, UcUser, UserRepo, UserUseCase};

/// Shared state of the user routes
pub type AppState<R, B> = Arc<UserUseCase<R, B>>;

/// Query of `GET /test`; a missing or zero id returns an empty user
#[derive(Debug, Deserialize, Validate)]
pub struct TestReq {
    #[serde(default)]
    pub id: u64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TestReply {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddTestReq {
    #[validate(length(min = 1, max = 20))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListTestReq {
    #[validate(range(min = 1))]
    pub page_num: Option<u64>,
    #[validate(range(min = 1))]
    pub page_size: Option<u64>,
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ListTestReply {
    pub id: u64,
    pub name: String,
    pub serial_number: i64,
}

impl From<UcUser> for TestReply {
    fn from(user: UcUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
        }
    }
}

impl From<UcUser> for ListTestReply {
    fn from(user: UcUser) -> Self {
        Self {
            id: user.id,
            name: user.name,
            serial_number: user.serial_number,
        }
    }
}

pub async fn test<R, B>(rc: RequestContext<AppState<R, B>>) -> anyhow::Result<Option<TestReply>>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    let req: TestReq = rc.bind_query()?;
    let user = rc.state().get(&DataContext::new(), req.id).await?;
    Ok(Some(user.into()))
}

pub async fn add_test<R, B>(rc: RequestContext<AppState<R, B>>) -> anyhow::Result<Option<()>>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    let req: AddTestReq = rc.bind_json()?;
    let user = UcUser {
        name: req.name,
        ..UcUser::default()
    };
    rc.state().add(&DataContext::new(), &user).await?;
    Ok(None)
}

pub async fn tran_test<R, B>(rc: RequestContext<AppState<R, B>>) -> anyhow::Result<Option<()>>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    rc.state().tran(&DataContext::new()).await?;
    Ok(None)
}

pub async fn list_test<R, B>(
    rc: RequestContext<AppState<R, B>>,
) -> anyhow::Result<Option<PageList<ListTestReply>>>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    let req: ListTestReq = rc.bind_query()?;
    let mut condition = ListCondition {
        page: Page::new(req.page_num.unwrap_or_default(), req.page_size.unwrap_or_default())
            .with_primary_key("id"),
        id: req.id,
        name: req.name,
    };

    let users = rc.state().list(&DataContext::new(), &mut condition).await?;
    let list = users.into_iter().map(ListTestReply::from).collect();
    Ok(Some(PageList::new(list, condition.page.total)))
}

/// Whether the caller may use admin endpoints
pub async fn is_admin<S>(rc: &RequestContext<S>) -> anyhow::Result<()> {
    tracing::debug!(user_id = rc.user_id(), "admin check");
    Ok(())
}
