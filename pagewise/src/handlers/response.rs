//! Response envelope for dispatched handlers
//!
//! Every dispatched call answers HTTP 200 with a JSON body of the form
//! `{"code": .., "msg": .., "data": ..}`. Failures carry their classified
//! code and message and no `data`; a success without a value omits `data`.
//!
//! # Example
//!
//! ```rust
//! use pagewise::handlers::{Envelope, PageList};
//!
//! let body = Envelope::success(Some(PageList::new(vec![1, 2, 3], 25)));
//! let json = serde_json::to_value(&body).unwrap();
//! assert_eq!(json["code"], 200);
//! assert_eq!(json["data"]["total"], 25);
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;

/// Uniform response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope<T> {
    pub code: i32,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn success(data: Option<T>) -> Self {
        let ok = ApiError::success();
        Self {
            code: ok.code(),
            msg: ok.message().to_string(),
            data,
        }
    }

    /// The envelope of a classified failure; `data` is always absent
    pub fn error(err: &ApiError) -> Self {
        Self {
            code: err.code(),
            msg: err.message().to_string(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Data of a paged listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageList<T> {
    pub list: Vec<T>,
    pub total: i64,
}

impl<T> PageList<T> {
    pub fn new(list: Vec<T>, total: i64) -> Self {
        Self { list, total }
    }
}

/// Classifies and renders a handler outcome exactly once
pub fn respond<T: Serialize>(result: anyhow::Result<Option<T>>) -> Response {
    match result {
        Ok(data) => Envelope::success(data).into_response(),
        Err(err) => Envelope::<()>::error(&ApiError::classify(err)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Reason;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_success_with_data() {
        let response = respond(Ok(Some(json!({"id": 7}))));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"code": 200, "msg": "success", "data": {"id": 7}})
        );
    }

    #[tokio::test]
    async fn test_success_without_data_omits_field() {
        let response = respond::<Value>(Ok(None));
        assert_eq!(
            body_json(response).await,
            json!({"code": 200, "msg": "success"})
        );
    }

    #[tokio::test]
    async fn test_error_is_http_200_without_data() {
        let response = respond::<Value>(Err(ApiError::params("name is required").into()));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"code": 10002, "msg": "name is required"})
        );
    }

    #[tokio::test]
    async fn test_foreign_error_is_masked() {
        let response = respond::<Value>(Err(anyhow::anyhow!("relation \"uc_users\" does not exist")));
        assert_eq!(
            body_json(response).await,
            json!({"code": 10001, "msg": "unknown error"})
        );
    }

    #[tokio::test]
    async fn test_page_list_shape() {
        let list = PageList::new(Vec::<Value>::new(), 0);
        let response = respond(Ok(Some(list)));
        assert_eq!(
            body_json(response).await,
            json!({"code": 200, "msg": "success", "data": {"list": [], "total": 0}})
        );
    }

    #[test]
    fn test_error_envelope_uses_registered_message() {
        let envelope = Envelope::<()>::error(&ApiError::from_reason(Reason::UnauthorizedUser));
        assert_eq!(envelope.code, 10003);
        assert_eq!(envelope.msg, "user is not authorized");
        assert!(envelope.data.is_none());
    }
}
