//! Ambient HTTP wiring: the real-time hub's WebSocket upgrade plus a
//! liveness probe, matching the teacher's `server/` module but trimmed to
//! only what this crate's own binary hosts (spec §1: "HTTP request routing
//! beyond the minimal surface needed to host the real-time hub's upgrade
//! and a liveness probe" is out of scope).

pub mod logging;
pub mod routes;

use std::sync::Arc;

use crate::hub::Hub;

pub use routes::build_router;

/// Shared state handed to every handler, mirroring the teacher's `AppState`
/// shape (`Arc`-wrapped shared resources, `Clone` for Axum's `State`
/// extractor).
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            hub,
            jwt_secret: jwt_secret.into(),
        }
    }
}
