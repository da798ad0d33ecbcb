//! Response helpers shared by the pipeline stages.
//!
//! # Responsibilities
//! - Build the small plain-text error responses the runtime emits
//! - Strip hop-by-hop headers from forwarded messages
//!
//! # Design Decisions
//! - Error bodies are generic; details go to the log, not the client
//! - Headers named by `Connection` are treated as hop-by-hop too

use axum::http::header::CONNECTION;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};

/// Headers that apply to a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Plain-text response with the given status.
pub fn text(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

/// Rejection for an unreadable or oversized request body.
pub fn invalid_body(status: StatusCode) -> Response {
    text(status, "Invalid request body")
}

pub fn not_found() -> Response {
    text(StatusCode::NOT_FOUND, "Not Found")
}

pub fn internal_error() -> Response {
    text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

pub fn bad_gateway() -> Response {
    text(StatusCode::BAD_GATEWAY, "Upstream request failed")
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}
