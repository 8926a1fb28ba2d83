//! Typed request identifiers
//!
//! Every dispatched request carries a [`RequestId`] of the form
//! `req_<base32 uuidv7>`. The server's request-id layer stamps one on the
//! inbound request via [`MakeTypedRequestId`]; the dispatcher picks it up with
//! [`RequestId::resolve`] so log lines and the `x-request-id` response header
//! agree.

use std::fmt;
use std::str::FromStr;

use http::{Extensions, Request};
use mti::prelude::*;
use tower_http::request_id::{MakeRequestId, RequestId as TowerRequestId};

/// Time-sortable request identifier with the `req` prefix.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(MagicTypeId);

impl RequestId {
    /// Prefix shared by all request ids.
    pub const PREFIX: &'static str = "req";

    /// Generates a fresh id backed by a UUIDv7.
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>())
    }

    /// Reuses the id stamped by the request-id layer, or generates a new one.
    ///
    /// Ids that were supplied by a client in a foreign format are replaced.
    #[must_use]
    pub fn resolve(extensions: &Extensions) -> Self {
        extensions
            .get::<TowerRequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = RequestIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = MagicTypeId::from_str(s).map_err(RequestIdError::Parse)?;
        let prefix = id.prefix().as_str();
        if prefix != Self::PREFIX {
            return Err(RequestIdError::InvalidPrefix {
                actual: prefix.to_string(),
            });
        }
        Ok(Self(id))
    }
}

/// Failure to parse a [`RequestId`].
#[derive(Debug, thiserror::Error)]
pub enum RequestIdError {
    #[error("failed to parse request id: {0}")]
    Parse(#[from] MagicTypeIdError),

    #[error("invalid request id prefix: expected 'req', got '{actual}'")]
    InvalidPrefix { actual: String },
}

/// tower-http id maker producing [`RequestId`] header values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTypedRequestId;

impl MakeRequestId for MakeTypedRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<TowerRequestId> {
        let id = RequestId::new();
        let value = http::HeaderValue::from_str(id.as_str()).ok()?;
        Some(TowerRequestId::new(value))
    }
}
