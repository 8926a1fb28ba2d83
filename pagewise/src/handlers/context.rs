//! Per-request context handed to dispatched handlers and filters

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Query,
    http::{request::Parts, Extensions, HeaderMap, Method, Uri},
};
use serde::de::DeserializeOwned;
use validator::Validate;

use super::error::ApiError;
use crate::ids::RequestId;

/// Authenticated caller, inserted as a request extension by an auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginUserId(pub u64);

/// Everything a handler may read about one inbound call.
///
/// Built once by the dispatcher and read-only afterwards. Cloning is cheap;
/// the request parts and body are shared.
pub struct RequestContext<S> {
    parts: Arc<Parts>,
    body: Bytes,
    user_id: u64,
    request_id: RequestId,
    handler_name: &'static str,
    span: tracing::Span,
    state: S,
}

impl<S> RequestContext<S> {
    pub(crate) fn new(
        parts: Parts,
        body: Bytes,
        request_id: RequestId,
        handler_name: &'static str,
        span: tracing::Span,
        state: S,
    ) -> Self {
        let user_id = parts
            .extensions
            .get::<LoginUserId>()
            .map_or(0, |id| id.0);

        Self {
            parts: Arc::new(parts),
            body,
            user_id,
            request_id,
            handler_name,
            span,
            state,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    pub fn extensions(&self) -> &Extensions {
        &self.parts.extensions
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The authenticated user, or 0 for anonymous calls
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Name the handler was registered under
    pub fn handler_name(&self) -> &'static str {
        self.handler_name
    }

    /// Span carrying the request id; dispatched work already runs inside it
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Deserializes and validates the query string.
    ///
    /// Failures become `PARAMS_ERROR` carrying the parse or validation text.
    pub fn bind_query<T>(&self) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let Query(value) =
            Query::<T>::try_from_uri(self.uri()).map_err(|e| ApiError::params(e.body_text()))?;
        value
            .validate()
            .map_err(|e| ApiError::params(e.to_string()))?;
        Ok(value)
    }

    /// Deserializes and validates a JSON body
    pub fn bind_json<T>(&self) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Validate,
    {
        let value: T =
            serde_json::from_slice(&self.body).map_err(|e| ApiError::params(e.to_string()))?;
        value
            .validate()
            .map_err(|e| ApiError::params(e.to_string()))?;
        Ok(value)
    }
}

impl<S: Clone> Clone for RequestContext<S> {
    fn clone(&self) -> Self {
        Self {
            parts: Arc::clone(&self.parts),
            body: self.body.clone(),
            user_id: self.user_id,
            request_id: self.request_id.clone(),
            handler_name: self.handler_name,
            span: self.span.clone(),
            state: self.state.clone(),
        }
    }
}

impl<S> std::fmt::Debug for RequestContext<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.parts.method)
            .field("uri", &self.parts.uri)
            .field("user_id", &self.user_id)
            .field("request_id", &self.request_id)
            .field("handler_name", &self.handler_name)
            .finish()
    }
}
