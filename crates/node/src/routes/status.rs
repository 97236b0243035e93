//! Participant status endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use participant::CoordinatorClient;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub in_flight_parts: usize,
    pub rpc_count: u64,
    pub unreliable: bool,
    pub dead: bool,
    pub callers: Vec<String>,
}

/// GET /status — snapshot of the participant and its listener.
pub async fn get<C: CoordinatorClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Json<StatusResponse> {
    let server = &state.server;
    Json(StatusResponse {
        in_flight_parts: server.participant().in_flight(),
        rpc_count: server.rpc_count(),
        unreliable: server.is_unreliable(),
        dead: server.is_dead(),
        callers: server.participant().callers().names(),
    })
}
