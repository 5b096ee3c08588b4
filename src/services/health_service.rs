use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the game store and the room hub, logging whichever fails.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store_ok = match state.coordinator().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "game store health check failed");
            false
        }
    };

    let rooms = match state.hub().rooms().await {
        Ok(rooms) => Some(rooms.len()),
        Err(err) => {
            warn!(error = %err, "room hub unavailable");
            None
        }
    };

    match rooms {
        Some(active) if store_ok => HealthResponse::ok(active),
        other => HealthResponse::degraded(other.unwrap_or_default()),
    }
}
