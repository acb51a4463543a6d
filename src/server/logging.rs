//! Request logging for the hub upgrade and health probe: a named span
//! constructor handed to `tower_http::trace::TraceLayer`, matching the
//! teacher's request-id-and-timing middleware but built on the
//! `tower-http` layer already in the dependency table.

use axum::body::Body;
use axum::http::Request;
use tracing::Span;
use uuid::Uuid;

pub fn make_span(request: &Request<Body>) -> Span {
    let request_id = Uuid::new_v4();
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}
