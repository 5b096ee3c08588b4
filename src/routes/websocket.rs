use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_valid::Valid;
use tracing::debug;

use crate::{dto::ws::ConnectQuery, services::websocket_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "rooms",
    params(ConnectQuery),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Missing or invalid identity parameters")
    )
)]
/// Upgrade the HTTP connection into a game room session.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<ConnectQuery>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let max_frame_bytes = state.config().connection.max_frame_bytes;
    debug!(game_id = %query.game_id, player_id = %query.player_id, "upgrading room socket");
    ws.max_message_size(max_frame_bytes)
        .max_frame_size(max_frame_bytes)
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, query.into()))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
