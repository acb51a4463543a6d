//! Router builder: the hub's WebSocket upgrade plus a liveness probe.
//! Everything else described in spec §6 as an external collaborator is
//! out of scope for this binary's HTTP surface.

use std::sync::Arc;

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::hub::{auth, session};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    token: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn hub_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
) -> Response {
    match auth::decode_token(&query.token, state.jwt_secret.as_bytes()) {
        Ok(claims) => {
            let hub = Arc::clone(&state.hub);
            ws.on_upgrade(move |socket| session::handle_socket(socket, hub, claims))
        }
        Err(e) => {
            tracing::warn!(error = %e, "rejecting hub upgrade with invalid token");
            ws.on_upgrade(session::reject_invalid_token)
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/realtime", get(hub_upgrade))
        .layer(TraceLayer::new_for_http().make_span_with(super::logging::make_span))
        .with_state(state)
}
