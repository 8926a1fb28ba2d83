//! Request dispatch, response envelope and error taxonomy
//!
//! Handlers are plain async functions over a [`RequestContext`] that return
//! `anyhow::Result<Option<T>>`. [`api`] turns one into an axum handler that
//! runs an ordered filter chain and always answers HTTP 200 with an
//! [`Envelope`]:
//!
//! | outcome            | body                                   |
//! |--------------------|----------------------------------------|
//! | `Ok(Some(data))`   | `{"code":200,"msg":"success","data":..}` |
//! | `Ok(None)`         | `{"code":200,"msg":"success"}`         |
//! | `Err(e)`           | `{"code":<code>,"msg":<message>}`      |
//!
//! Errors are classified through [`ApiError::classify`]; anything that is
//! not a registered [`ApiError`] is reported as `UNKNOWN_ERROR` and only its
//! log line keeps the detail.
//!
//! # Example
//!
//! ```rust
//! use axum::{routing::get, Router};
//! use pagewise::handlers::{api, ApiError, PageList, RequestContext};
//! use serde::Deserialize;
//! use validator::Validate;
//!
//! #[derive(Deserialize, Validate)]
//! #[serde(rename_all = "camelCase")]
//! struct ListParams {
//!     #[validate(range(min = 1))]
//!     page_num: Option<u64>,
//! }
//!
//! async fn list(rc: RequestContext<()>) -> anyhow::Result<Option<PageList<String>>> {
//!     let params: ListParams = rc.bind_query()?;
//!     if params.page_num == Some(99) {
//!         return Err(ApiError::data_not_found().into());
//!     }
//!     Ok(Some(PageList::new(vec!["ann".to_string()], 1)))
//! }
//!
//! let app: Router = Router::new().route("/list", get(api("List", list, [])));
//! ```

mod context;
mod dispatch;
mod error;
mod response;

pub use context::{LoginUserId, RequestContext};
pub use dispatch::{
    api, filter_fn, Endpoint, Filter, Next, RequestHandler, DEFAULT_BODY_LIMIT,
};
pub use error::{ApiError, Reason, UNKNOWN_CODE};
pub use response::{respond, Envelope, PageList};
