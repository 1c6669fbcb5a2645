//! Response construction.
//!
//! # Responsibilities
//! - Build JSON and raw responses with a status code
//! - Attach cross-origin headers when the request origin is allowed
//! - Merge caller-supplied headers last so they win on conflict
//!
//! # Design Decisions
//! - The origin policy is consulted exactly once per response
//! - Serialization failures degrade to a 500, never a panic
//! - Upgrade responses are decorated in place, status and body untouched

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Serialize;

use crate::security::OriginPolicy;

/// Content type of every structured response.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=UTF-8";

const ALLOW_METHODS: &str = "GET,HEAD,POST,OPTIONS";
const MAX_AGE_SECS: &str = "86400";

/// Body of every error response the relay produces.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: &'static str,
}

impl ErrorBody {
    pub const NOT_FOUND: ErrorBody = ErrorBody { message: "Not Found" };
    pub const EXPECTED_WEBSOCKET: ErrorBody = ErrorBody { message: "expected websocket" };
}

/// Status, declared origin and extra headers for a response.
#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    pub status: StatusCode,
    pub origin: Option<String>,
    pub headers: HeaderMap,
}

impl ResponseOptions {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn origin(mut self, origin: Option<&str>) -> Self {
        self.origin = origin.map(str::to_string);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Cross-origin headers granted to `origin`, or an empty map if it is not allowed.
pub fn cors_headers(policy: &OriginPolicy, origin: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if !policy.is_allowed(origin) {
        return headers;
    }
    let Some(value) = origin.and_then(|o| HeaderValue::from_str(o).ok()) else {
        return headers;
    };

    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE_SECS));
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    headers
}

/// Replace every header in `target` that also appears in `overrides`.
fn merge_headers(target: &mut HeaderMap, overrides: HeaderMap) {
    let names: Vec<HeaderName> = overrides.keys().cloned().collect();
    for name in &names {
        target.remove(name);
    }
    for (name, value) in overrides.iter() {
        target.append(name.clone(), value.clone());
    }
}

fn apply(policy: &OriginPolicy, headers: &mut HeaderMap, origin: Option<&str>, extra: HeaderMap) {
    merge_headers(headers, cors_headers(policy, origin));
    merge_headers(headers, extra);
}

/// Structured response: `body` serialized as JSON.
pub fn json<T: Serialize + ?Sized>(
    policy: &OriginPolicy,
    body: &T,
    options: ResponseOptions,
) -> Response {
    let ResponseOptions {
        status,
        origin,
        headers,
    } = options;

    let (status, payload) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize response body");
            (StatusCode::INTERNAL_SERVER_ERROR, b"{}".to_vec())
        }
    };

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(JSON_CONTENT_TYPE),
    );
    apply(policy, response.headers_mut(), origin.as_deref(), headers);
    response
}

/// Opaque response: `body` passed through unmodified.
pub fn raw(policy: &OriginPolicy, body: impl Into<Body>, options: ResponseOptions) -> Response {
    let ResponseOptions {
        status,
        origin,
        headers,
    } = options;

    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    apply(policy, response.headers_mut(), origin.as_deref(), headers);
    response
}

/// Add cross-origin and caller headers to an already built response.
pub fn decorate(
    policy: &OriginPolicy,
    mut response: Response,
    origin: Option<&str>,
    headers: HeaderMap,
) -> Response {
    apply(policy, response.headers_mut(), origin, headers);
    response
}

/// The fixed 404 body.
pub fn not_found(policy: &OriginPolicy, origin: Option<&str>) -> Response {
    json(
        policy,
        &ErrorBody::NOT_FOUND,
        ResponseOptions::new(StatusCode::NOT_FOUND).origin(origin),
    )
}
