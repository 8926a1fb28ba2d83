//! Error taxonomy for the response envelope
//!
//! Every failure a client sees is an [`ApiError`]: a stable machine
//! [`Reason`], the numeric wire code registered for it, and a human message.
//! An optional cause is kept for logs and never serialized.
//!
//! Handlers return `anyhow::Result`; [`ApiError::classify`] finds the
//! `ApiError` anywhere in the error chain, and anything else becomes
//! `UNKNOWN_ERROR` with the original error demoted to the cause.
//!
//! # Example
//!
//! ```rust
//! use pagewise::handlers::{ApiError, Reason};
//!
//! let err = ApiError::with_message(Reason::ParamsError, "pageNum must be at least 1");
//! assert_eq!(err.code(), 10002);
//!
//! let classified = ApiError::classify(anyhow::anyhow!("connection reset"));
//! assert_eq!(classified.code(), 10001);
//! assert_eq!(classified.message(), "unknown error");
//! ```

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, LazyLock};

use crate::repository::RepositoryError;

/// Wire code of [`Reason::UnknownError`]
pub const UNKNOWN_CODE: i32 = 10001;

/// Registered failure reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    Success,
    UnknownError,
    ParamsError,
    UnauthorizedUser,
    LoginTokenIsExpired,
    LoginPermissionDenied,
    UserIsNotFound,
    DataIsNotFound,
}

static REGISTRY: LazyLock<HashMap<&'static str, Reason>> =
    LazyLock::new(|| Reason::ALL.iter().map(|r| (r.as_str(), *r)).collect());

impl Reason {
    pub const ALL: [Reason; 8] = [
        Reason::Success,
        Reason::UnknownError,
        Reason::ParamsError,
        Reason::UnauthorizedUser,
        Reason::LoginTokenIsExpired,
        Reason::LoginPermissionDenied,
        Reason::UserIsNotFound,
        Reason::DataIsNotFound,
    ];

    /// The machine tag clients match on
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::ParamsError => "PARAMS_ERROR",
            Self::UnauthorizedUser => "UNAUTHORIZED_USER",
            Self::LoginTokenIsExpired => "LOGIN_TOKEN_IS_EXPIRED",
            Self::LoginPermissionDenied => "LOGIN_PERMISSION_DENIED",
            // Spelling is part of the wire contract.
            Self::UserIsNotFound => "REASON_USER_IS_NOT_FOUNT",
            Self::DataIsNotFound => "REASON_DATA_IS_NOT_FOUNT",
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Success => 200,
            Self::UnknownError => UNKNOWN_CODE,
            Self::ParamsError => 10002,
            Self::UnauthorizedUser => 10003,
            Self::LoginTokenIsExpired => 10004,
            Self::LoginPermissionDenied => 10005,
            Self::UserIsNotFound => 10006,
            Self::DataIsNotFound => 10007,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::UnknownError => "unknown error",
            Self::ParamsError => "invalid request parameters",
            Self::UnauthorizedUser => "user is not authorized",
            Self::LoginTokenIsExpired => "login has expired",
            Self::LoginPermissionDenied => "login is not permitted",
            Self::UserIsNotFound => "user does not exist",
            Self::DataIsNotFound => "data is not found",
        }
    }

    /// Looks up a reason by its tag
    pub fn lookup(tag: &str) -> Option<Self> {
        REGISTRY.get(tag).copied()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// A classified failure
#[derive(Clone)]
pub struct ApiError {
    code: i32,
    reason: String,
    message: String,
    cause: Option<Cause>,
}

impl ApiError {
    /// Builds an error from a reason tag; unregistered tags get [`UNKNOWN_CODE`]
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        let reason = reason.into();
        let code = Reason::lookup(&reason).map_or(UNKNOWN_CODE, Reason::code);
        Self::with_code(code, reason, message)
    }

    /// Builds an error with an explicit code, bypassing the registry
    pub fn with_code(code: i32, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// The registered code and default message for `reason`
    pub fn from_reason(reason: Reason) -> Self {
        Self::with_code(reason.code(), reason.as_str(), reason.default_message())
    }

    /// The registered code for `reason` with a custom message
    pub fn with_message(reason: Reason, message: impl Into<String>) -> Self {
        Self::with_code(reason.code(), reason.as_str(), message)
    }

    pub fn params(message: impl Into<String>) -> Self {
        Self::with_message(Reason::ParamsError, message)
    }

    pub fn data_not_found() -> Self {
        Self::from_reason(Reason::DataIsNotFound)
    }

    pub fn unknown() -> Self {
        Self::from_reason(Reason::UnknownError)
    }

    /// The `SUCCESS` entry, used to render envelopes of successful calls
    pub fn success() -> Self {
        Self::from_reason(Reason::Success)
    }

    /// A copy of this error with `cause` attached
    #[must_use]
    pub fn with_cause(&self, cause: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        let mut err = self.clone();
        err.cause = Some(Arc::from(cause.into()));
        err
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Same code and reason
    pub fn is(&self, other: &ApiError) -> bool {
        self.code == other.code && self.reason == other.reason
    }

    pub fn is_reason(&self, reason: Reason) -> bool {
        self.code == reason.code() && self.reason == reason.as_str()
    }

    /// Whether the reason is in the registry
    pub fn is_registered(&self) -> bool {
        Reason::lookup(&self.reason).is_some()
    }

    /// Normalizes any error into a registered `ApiError`.
    ///
    /// The first `ApiError` in the chain wins. Unregistered reasons and
    /// foreign errors become `UNKNOWN_ERROR` with the original kept as the
    /// cause. Classifying an already classified error changes nothing.
    pub fn classify(err: anyhow::Error) -> Self {
        let found = err.chain().find_map(|e| e.downcast_ref::<ApiError>()).cloned();
        match found {
            Some(api) if api.is_registered() => api,
            Some(api) => Self::unknown().with_cause(api),
            None => Self::unknown().with_cause(err),
        }
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiError")
            .field("code", &self.code)
            .field("reason", &self.reason)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error: code = {} reason = {} message = {}",
            self.code, self.reason, self.message
        )?;
        if let Some(cause) = &self.cause {
            write!(f, " cause = {}", cause)?;
        }
        Ok(())
    }
}

impl StdError for ApiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

impl From<Reason> for ApiError {
    fn from(reason: Reason) -> Self {
        Self::from_reason(reason)
    }
}

/// Store "not found" becomes `REASON_DATA_IS_NOT_FOUNT`; every other
/// repository failure is unknown to clients.
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        if err.is_not_found() {
            Self::data_not_found().with_cause(err)
        } else {
            Self::unknown().with_cause(err)
        }
    }
}
