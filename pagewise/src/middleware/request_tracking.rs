//! Request id stamping, propagation and sensitive header handling

use http::HeaderMap;
use serde_json::{Map, Value};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};

use crate::ids::MakeTypedRequestId;

/// Headers whose values are never written to logs.
pub const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "cookie",
    "set-cookie",
    "x-api-key",
    "x-auth-token",
];

const MASK: &str = "***";

/// Stamps a typed `x-request-id` on requests that lack one.
pub fn request_id_layer() -> SetRequestIdLayer<MakeTypedRequestId> {
    SetRequestIdLayer::x_request_id(MakeTypedRequestId)
}

/// Copies the request's `x-request-id` onto the response.
pub fn request_id_propagation_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

/// Marks [`SENSITIVE_HEADERS`] so tower-http's own tracing redacts them.
pub fn sensitive_headers_layer() -> SetSensitiveRequestHeadersLayer {
    let headers = SENSITIVE_HEADERS
        .iter()
        .map(|name| http::HeaderName::from_static(name))
        .collect::<Vec<_>>();

    SetSensitiveRequestHeadersLayer::new(headers)
}

/// Renders headers as a JSON object for the per-request dispatch log line.
///
/// Sensitive values, and values flagged sensitive by an upstream layer, are
/// replaced by a mask. Repeated headers collapse into an array.
pub fn headers_json(headers: &HeaderMap) -> Value {
    let mut out = Map::new();
    for name in headers.keys() {
        let values = headers
            .get_all(name)
            .iter()
            .map(|value| {
                if value.is_sensitive() || SENSITIVE_HEADERS.contains(&name.as_str()) {
                    Value::from(MASK)
                } else {
                    Value::from(String::from_utf8_lossy(value.as_bytes()).into_owned())
                }
            })
            .collect::<Vec<_>>();

        let value = match <[Value; 1]>::try_from(values) {
            Ok([single]) => single,
            Err(many) => Value::Array(many),
        };
        out.insert(name.as_str().to_string(), value);
    }
    Value::Object(out)
}
