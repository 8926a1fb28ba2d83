//! Route table of the user service

use std::sync::Arc;
use std::time::Instant;

use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use pagewise::{
    handlers::{api, filter_fn, ApiError, Envelope, Filter, RequestContext},
    transaction::TxBegin,
};

use crate::{
    biz::{UserRepo, UserUseCase},
    service::{self, AppState},
};

pub fn router<R, B>(uc: UserUseCase<R, B>) -> Router
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    Router::new()
        .route("/test", get(api("Test", service::test::<R, B>, [])))
        .route("/test/add", post(api("AddTest", service::add_test::<R, B>, [])))
        .route(
            "/test/tran",
            post(api("TranTest", service::tran_test::<R, B>, [super_admin()])),
        )
        .route("/test/list", get(api("ListTest", service::list_test::<R, B>, [])))
        .with_state(Arc::new(uc))
}

/// Lets the call through only when [`service::is_admin`] accepts the caller
pub fn super_admin<R, B>() -> Filter<AppState<R, B>>
where
    R: UserRepo,
    B: TxBegin<Tx = R::Tx> + 'static,
{
    filter_fn(|rc: RequestContext<AppState<R, B>>, next| async move {
        let started = Instant::now();
        if let Err(err) = service::is_admin(&rc).await {
            let elapsed = format!("{:.3}ms", started.elapsed().as_secs_f64() * 1000.0);
            tracing::error!(filter = "SuperAdmin", elapsed = %elapsed, error = ?err, "admin check failed");
            return Envelope::<()>::error(&ApiError::classify(err)).into_response();
        }
        next(rc).await
    })
}
