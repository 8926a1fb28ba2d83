//! Outbound HTTP client
//!
//! [`HttpClient`] collects query parameters, headers, cookies, a body and
//! files, then sends them as a GET, a form or JSON POST, a JSON PUT, or a
//! multipart upload. Builders are cheap to clone; the underlying
//! `reqwest::Client` and its connection pool are shared.
//!
//! # Example
//!
//! ```rust,no_run
//! use pagewise::client::HttpClient;
//!
//! # async fn run() -> Result<(), pagewise::client::ClientError> {
//! let response = HttpClient::new()?
//!     .param("id", "7")
//!     .header("x-token", "abc")
//!     .get("https://users.internal/test")
//!     .await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, SET_COOKIE},
    multipart::{Form, Part},
    Method, RequestBuilder, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Per-request timeout unless overridden with [`HttpClient::timeout`]
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("the url is empty")]
    EmptyUrl,

    #[error("no file to send")]
    EmptyFile,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("invalid header {name}: {message}")]
    InvalidHeader { name: String, message: String },

    #[error("failed to read {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Request builder over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpClient {
    http: reqwest::Client,
    timeout: Duration,
    params: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, String>,
    files: BTreeMap<String, PathBuf>,
    body: Option<Vec<u8>>,
}

/// A fully read response
#[derive(Debug, Clone)]
pub struct ClientResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Name and value of every `set-cookie` header
    pub cookies: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

impl HttpClient {
    pub fn new() -> ClientResult<Self> {
        Ok(Self::from_client(reqwest::Client::builder().build()?))
    }

    /// Wraps an already configured client, keeping its pool and TLS setup
    pub fn from_client(http: reqwest::Client) -> Self {
        Self {
            http,
            timeout: DEFAULT_TIMEOUT,
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            files: BTreeMap::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets a query parameter for [`get`](Self::get), replacing one of the
    /// same name already in the URL
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn cookie(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn cookies<K, V>(mut self, cookies: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.cookies
            .extend(cookies.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Adds a file for [`send_files`](Self::send_files) under form field `field`
    #[must_use]
    pub fn file(mut self, field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.files.insert(field.into(), path.into());
        self
    }

    #[must_use]
    pub fn files<K, P>(mut self, files: impl IntoIterator<Item = (K, P)>) -> Self
    where
        K: Into<String>,
        P: Into<PathBuf>,
    {
        self.files
            .extend(files.into_iter().map(|(k, p)| (k.into(), p.into())));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `value` as the body
    pub fn json_body<T: Serialize + ?Sized>(mut self, value: &T) -> ClientResult<Self> {
        self.body = Some(serde_json::to_vec(value)?);
        Ok(self)
    }

    /// GET with the configured parameters merged into the URL's query
    pub async fn get(&self, url: &str) -> ClientResult<ClientResponse> {
        let mut url = parse_url(url)?;
        let mut query: BTreeMap<String, String> = url.query_pairs().into_owned().collect();
        query.extend(self.params.clone());
        if query.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&query);
        }

        let headers = self.header_map(None)?;
        self.send(self.http.get(url).headers(headers)).await
    }

    /// POST as `application/x-www-form-urlencoded`.
    ///
    /// The body, if any, must be a JSON object; each member becomes one form
    /// field, strings unquoted and other values in their JSON text.
    pub async fn post_form(&self, url: &str) -> ClientResult<ClientResponse> {
        let url = parse_url(url)?;
        let headers = self.header_map(Some(FORM_CONTENT_TYPE))?;
        let mut request = self.http.post(url).headers(headers);
        if let Some(body) = &self.body {
            request = request.form(&form_fields(body)?);
        }
        self.send(request).await
    }

    /// POST as `application/json`
    pub async fn post_json(&self, url: &str) -> ClientResult<ClientResponse> {
        self.send_json(Method::POST, url).await
    }

    /// PUT as `application/json`
    pub async fn put_json(&self, url: &str) -> ClientResult<ClientResponse> {
        self.send_json(Method::PUT, url).await
    }

    /// POST the configured files as `multipart/form-data`
    pub async fn send_files(&self, url: &str) -> ClientResult<ClientResponse> {
        let url = parse_url(url)?;
        if self.files.is_empty() {
            return Err(ClientError::EmptyFile);
        }

        let mut form = Form::new();
        for (field, path) in &self.files {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|source| ClientError::File {
                    path: path.clone(),
                    source,
                })?;
            let part = Part::bytes(bytes).file_name(file_name(path));
            form = form.part(field.clone(), part);
        }

        let headers = self.header_map(None)?;
        self.send(self.http.post(url).headers(headers).multipart(form))
            .await
    }

    async fn send_json(&self, method: Method, url: &str) -> ClientResult<ClientResponse> {
        let url = parse_url(url)?;
        let headers = self.header_map(Some(JSON_CONTENT_TYPE))?;
        let mut request = self.http.request(method, url).headers(headers);
        if let Some(body) = &self.body {
            request = request.body(body.clone());
        }
        self.send(request).await
    }

    /// Configured headers and cookies; `content_type` replaces any
    /// caller-supplied content type
    fn header_map(&self, content_type: Option<&'static str>) -> ClientResult<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            map.insert(header_name(name)?, header_value(name, value)?);
        }
        map.remove(CONTENT_TYPE);
        if let Some(content_type) = content_type {
            map.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            map.insert(COOKIE, header_value("cookie", &cookie)?);
        }
        Ok(map)
    }

    async fn send(&self, request: RequestBuilder) -> ClientResult<ClientResponse> {
        let request = request.timeout(self.timeout).build()?;
        let (method, url) = (request.method().clone(), request.url().clone());
        let started = Instant::now();

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(%method, %url, error = %err, "outbound request failed");
                return Err(err.into());
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(
            %method,
            %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "outbound request"
        );

        Ok(ClientResponse {
            status,
            cookies: response_cookies(&headers),
            headers,
            body,
        })
    }
}

fn parse_url(url: &str) -> ClientResult<Url> {
    if url.is_empty() {
        return Err(ClientError::EmptyUrl);
    }
    Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{url}: {e}")))
}

fn header_name(name: &str) -> ClientResult<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn header_value(name: &str, value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
        name: name.to_string(),
        message: e.to_string(),
    })
}

fn form_fields(body: &[u8]) -> ClientResult<Vec<(String, String)>> {
    let object: Map<String, Value> = serde_json::from_slice(body)?;
    Ok(object
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn response_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|cookie| {
            let pair = cookie.split(';').next()?;
            let (name, value) = pair.split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}
