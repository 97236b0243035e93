//! Fault-injection controls for test harnesses.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use participant::CoordinatorClient;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct UnreliableRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub unreliable: bool,
    pub dead: bool,
}

impl ControlResponse {
    fn of<C: CoordinatorClient>(state: &AppState<C>) -> Self {
        Self {
            unreliable: state.server.is_unreliable(),
            dead: state.server.is_dead(),
        }
    }
}

/// POST /control/unreliable — toggle connection dropping and reply loss.
#[tracing::instrument(skip(state))]
pub async fn set_unreliable<C: CoordinatorClient>(
    State(state): State<Arc<AppState<C>>>,
    Json(req): Json<UnreliableRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    if state.server.is_dead() {
        return Err(ApiError::Conflict("participant listener is dead".to_string()));
    }
    state.server.set_unreliable(req.enabled);
    tracing::info!(enabled = req.enabled, "unreliable mode changed");
    Ok(Json(ControlResponse::of(&state)))
}

/// POST /control/kill — stop accepting RPC connections. Irreversible.
#[tracing::instrument(skip(state))]
pub async fn kill<C: CoordinatorClient>(
    State(state): State<Arc<AppState<C>>>,
) -> Result<Json<ControlResponse>, ApiError> {
    if state.server.is_dead() {
        return Err(ApiError::Conflict("participant listener already dead".to_string()));
    }
    state.server.kill();
    tracing::warn!("participant listener killed");
    Ok(Json(ControlResponse::of(&state)))
}
