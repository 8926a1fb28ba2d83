//! Transport middleware: request ids and header hygiene

mod request_tracking;

pub use request_tracking::{
    headers_json, request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
    SENSITIVE_HEADERS,
};
