//! Uniform handler dispatch with an ordered filter chain
//!
//! [`api`] adapts a handler of the shape
//! `Fn(RequestContext<S>) -> Future<Output = anyhow::Result<Option<T>>>` into
//! an axum handler. Per call it resolves the request id, opens a span
//! carrying it, logs the inbound headers, buffers the body, and runs the
//! filter chain. The outcome is classified and rendered once as an [`Envelope`].
//!
//! Filters wrap the handler. The last filter listed is the outermost, so it
//! runs first; the first listed sits next to the handler. A filter
//! short-circuits by returning a response without calling `next`.
//!
//! # Example
//!
//! ```rust
//! use axum::{response::IntoResponse, routing::get, Router};
//! use pagewise::handlers::{api, filter_fn, ApiError, Envelope, Reason, RequestContext};
//!
//! async fn hello(_rc: RequestContext<()>) -> anyhow::Result<Option<&'static str>> {
//!     Ok(Some("hello"))
//! }
//!
//! let logged_in = filter_fn(|rc: RequestContext<()>, next| async move {
//!     if rc.user_id() == 0 {
//!         let err = ApiError::from_reason(Reason::UnauthorizedUser);
//!         return Envelope::<()>::error(&err).into_response();
//!     }
//!     next(rc).await
//! });
//!
//! let app: Router = Router::new().route("/hello", get(api("Hello", hello, [logged_in])));
//! ```
//!
//! [`Envelope`]: super::Envelope

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::Request,
    handler::Handler,
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tracing::Instrument;

use super::{
    context::RequestContext,
    error::ApiError,
    response::{respond, Envelope},
};
use crate::{ids::RequestId, middleware::headers_json};

/// Largest request body the dispatcher buffers unless overridden
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// A type-erased step of the chain: the handler or a filter around it
pub type RequestHandler<S> =
    Arc<dyn Fn(RequestContext<S>) -> BoxFuture<'static, Response> + Send + Sync>;

/// The rest of the chain, as seen from inside a filter
pub type Next<S> = RequestHandler<S>;

/// Wraps one step of the chain into another
pub type Filter<S> = Arc<dyn Fn(RequestHandler<S>) -> RequestHandler<S> + Send + Sync>;

/// Builds a [`Filter`] from an async closure taking the context and `next`
pub fn filter_fn<S, F, Fut>(f: F) -> Filter<S>
where
    S: Send + 'static,
    F: Fn(RequestContext<S>, Next<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |next: RequestHandler<S>| {
        let f = Arc::clone(&f);
        Arc::new(move |rc: RequestContext<S>| -> BoxFuture<'static, Response> {
            Box::pin((*f)(rc, Arc::clone(&next)))
        }) as RequestHandler<S>
    })
}

/// Registers `handler` under `name` behind `filters`.
///
/// Errors returned by the handler are logged with their full chain before
/// classification. A panic in the handler is logged and resumed so the
/// transport's panic layer decides the response.
pub fn api<S, H, Fut, T>(
    name: &'static str,
    handler: H,
    filters: impl IntoIterator<Item = Filter<S>>,
) -> Endpoint<S>
where
    S: Send + 'static,
    H: Fn(RequestContext<S>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let handler = Arc::new(handler);
    let inner: RequestHandler<S> = Arc::new(move |rc: RequestContext<S>| -> BoxFuture<'static, Response> {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            match AssertUnwindSafe(async move { (*handler)(rc).await })
                .catch_unwind()
                .await
            {
                Ok(result) => {
                    if let Err(err) = &result {
                        tracing::error!(handler = name, error = ?err, "handler failed");
                    }
                    respond(result)
                }
                Err(panic) => {
                    tracing::error!(handler = name, "handler panicked");
                    std::panic::resume_unwind(panic)
                }
            }
        })
    });

    let chain = filters
        .into_iter()
        .fold(inner, |next, filter| (*filter)(next));

    Endpoint {
        name,
        chain,
        body_limit: DEFAULT_BODY_LIMIT,
    }
}

/// A dispatched handler, routable with axum's method routers
pub struct Endpoint<S> {
    name: &'static str,
    chain: RequestHandler<S>,
    body_limit: usize,
}

impl<S> Endpoint<S> {
    #[must_use]
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<S> Clone for Endpoint<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            chain: Arc::clone(&self.chain),
            body_limit: self.body_limit,
        }
    }
}

impl<S> Handler<(), S> for Endpoint<S>
where
    S: Clone + Send + Sync + 'static,
{
    type Future = BoxFuture<'static, Response>;

    fn call(self, req: Request, state: S) -> Self::Future {
        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let request_id = RequestId::resolve(&parts.extensions);
            let span = tracing::info_span!(
                "request",
                request_id = %request_id,
                handler = self.name
            );

            span.in_scope(|| {
                tracing::info!(
                    method = %parts.method,
                    uri = %parts.uri,
                    headers = %headers_json(&parts.headers),
                    "inbound request"
                )
            });

            let body = match axum::body::to_bytes(body, self.body_limit)
                .instrument(span.clone())
                .await
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    span.in_scope(|| tracing::warn!(error = %err, "failed to read request body"));
                    let err = ApiError::params(format!("failed to read request body: {err}"));
                    return Envelope::<()>::error(&err).into_response();
                }
            };

            let rc = RequestContext::new(parts, body, request_id, self.name, span.clone(), state);
            (*self.chain)(rc).instrument(span).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, handlers::Reason, server::Server};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    type Trace = Arc<Mutex<Vec<String>>>;

    fn recording(trace: &Trace, label: &'static str) -> Filter<()> {
        let trace = Arc::clone(trace);
        filter_fn(move |rc: RequestContext<()>, next| {
            let trace = Arc::clone(&trace);
            async move {
                trace.lock().unwrap().push(label.to_string());
                next(rc).await
            }
        })
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    /// JSON log lines written by a scoped subscriber
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .json()
                .with_writer(self.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn events(&self, message: &str) -> Vec<Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .filter_map(|line| serde_json::from_str::<Value>(line).ok())
                .filter(|event| event["fields"]["message"] == message)
                .collect()
        }
    }

    #[tokio::test]
    async fn test_last_filter_is_outermost() {
        let trace: Trace = Arc::default();
        let handler_trace = Arc::clone(&trace);
        let endpoint = api(
            "Order",
            move |_rc: RequestContext<()>| {
                let trace = Arc::clone(&handler_trace);
                async move {
                    trace.lock().unwrap().push("handler".to_string());
                    anyhow::Ok(None::<()>)
                }
            },
            [recording(&trace, "first"), recording(&trace, "second")],
        );
        let app = Router::new().route("/", get(endpoint));

        let (_, body) = call(app, get_request("/")).await;

        assert_eq!(body, json!({"code": 200, "msg": "success"}));
        assert_eq!(*trace.lock().unwrap(), vec!["second", "first", "handler"]);
    }

    #[tokio::test]
    async fn test_filter_short_circuits() {
        let called: Arc<Mutex<bool>> = Arc::default();
        let flag = Arc::clone(&called);
        let deny = filter_fn(|_rc: RequestContext<()>, _next| async {
            Envelope::<()>::error(&ApiError::from_reason(Reason::LoginPermissionDenied))
                .into_response()
        });
        let endpoint = api(
            "Denied",
            move |_rc: RequestContext<()>| {
                let flag = Arc::clone(&flag);
                async move {
                    *flag.lock().unwrap() = true;
                    anyhow::Ok(Some(1))
                }
            },
            [deny],
        );
        let app = Router::new().route("/", get(endpoint));

        let (status, body) = call(app, get_request("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": 10005, "msg": "login is not permitted"}));
        assert!(!*called.lock().unwrap());
    }

    #[tokio::test]
    async fn test_handler_error_is_classified() {
        let endpoint = api(
            "Fails",
            |_rc: RequestContext<()>| async {
                Err::<Option<()>, _>(anyhow::anyhow!("relation does not exist"))
            },
            [],
        );
        let app = Router::new().route("/", get(endpoint));

        let (status, body) = call(app, get_request("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"code": 10001, "msg": "unknown error"}));
    }

    #[tokio::test]
    async fn test_handler_reads_state_and_body() {
        #[derive(serde::Deserialize, validator::Validate)]
        struct Add {
            #[validate(length(min = 1, max = 20))]
            name: String,
        }

        let endpoint = api(
            "Echo",
            |rc: RequestContext<&'static str>| async move {
                let add: Add = rc.bind_json()?;
                anyhow::Ok(Some(json!({"state": rc.state(), "name": add.name})))
            },
            [],
        );
        let app = Router::new()
            .route("/echo", post(endpoint))
            .with_state("users");

        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"name":"ann"}"#))
            .unwrap();
        let (_, body) = call(app.clone(), request).await;
        assert_eq!(body["data"], json!({"state": "users", "name": "ann"}));

        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from(r#"{"name":""}"#))
            .unwrap();
        let (_, body) = call(app, request).await;
        assert_eq!(body["code"], 10002);
    }

    #[tokio::test]
    async fn test_inbound_request_logged_once_with_masked_headers() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let endpoint = api(
            "Logged",
            |rc: RequestContext<()>| async move { anyhow::Ok(Some(rc.request_id().to_string())) },
            [],
        );
        let app = Router::new().route("/logged", get(endpoint));
        let request = Request::builder()
            .uri("/logged?id=3")
            .header("authorization", "Bearer secret-token")
            .header("accept", "application/json")
            .body(Body::empty())
            .unwrap();

        let (_, body) = call(app, request).await;

        let events = logs.events("inbound request");
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["span"]["handler"], "Logged");
        assert_eq!(event["span"]["request_id"], body["data"]);
        assert_eq!(event["fields"]["uri"], "/logged?id=3");

        let headers: Value =
            serde_json::from_str(event["fields"]["headers"].as_str().unwrap()).unwrap();
        assert_eq!(headers["authorization"], "***");
        assert_eq!(headers["accept"], "application/json");
        assert!(!event.to_string().contains("secret-token"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_params_error() {
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let endpoint = api(
            "Small",
            |_rc: RequestContext<()>| async { anyhow::Ok(None::<()>) },
            [],
        )
        .with_body_limit(4);
        let app = Router::new().route("/", post(endpoint));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("0123456789"))
            .unwrap();
        let (status, body) = call(app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 10002);
        assert_eq!(logs.events("inbound request").len(), 1);
    }

    #[tokio::test]
    async fn test_panic_reaches_transport_layer() {
        let endpoint = api(
            "Panics",
            |_rc: RequestContext<()>| async {
                if true {
                    panic!("boom");
                }
                anyhow::Ok(None::<()>)
            },
            [],
        );
        let app = Router::new()
            .route("/", get(endpoint))
            .layer(CatchPanicLayer::new());

        let response = app.oneshot(get_request("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_request_id_matches_response_header() {
        let endpoint = api(
            "WhoAmI",
            |rc: RequestContext<()>| async move { anyhow::Ok(Some(rc.request_id().to_string())) },
            [],
        );
        let app = Server::new(Config::default())
            .apply_middleware(Router::new().route("/", get(endpoint)));

        let response = app.oneshot(get_request("/")).await.unwrap();
        let header = response
            .headers()
            .get("x-request-id")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();

        assert!(header.starts_with("req_"));
        assert_eq!(body["data"], json!(header));
    }
}
