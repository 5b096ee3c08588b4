use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::game::{CreateGameRequest, CreateGameResponse, GameView, RoomSummary},
    error::AppError,
    services::game_service,
    state::SharedState,
};

/// Routes handling game creation and inspection.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games", post(create_game))
        .route("/games/{id}", get(get_game))
        .route("/rooms", get(list_rooms))
}

/// Open a new game and seat its creator.
#[utoipa::path(
    post,
    path = "/games",
    tag = "game",
    request_body = CreateGameRequest,
    responses(
        (status = 200, description = "Game created", body = CreateGameResponse),
        (status = 400, description = "Invalid payload or capacity"),
        (status = 503, description = "Game store unavailable")
    )
)]
pub async fn create_game(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateGameRequest>>,
) -> Result<Json<CreateGameResponse>, AppError> {
    let created = game_service::create_game(&state, payload).await?;
    Ok(Json(created))
}

/// Current status, roster and scores of a game.
#[utoipa::path(
    get,
    path = "/games/{id}",
    tag = "game",
    params(("id" = String, Path, description = "Identifier of the game")),
    responses(
        (status = 200, description = "Game found", body = GameView),
        (status = 404, description = "Unknown or expired game")
    )
)]
pub async fn get_game(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<GameView>, AppError> {
    let view = game_service::game_status(&state, &id).await?;
    Ok(Json(view))
}

/// List the rooms with at least one open connection, newest first.
#[utoipa::path(
    get,
    path = "/rooms",
    tag = "rooms",
    responses((status = 200, description = "Live rooms", body = [RoomSummary]))
)]
pub async fn list_rooms(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RoomSummary>>, AppError> {
    let rooms = game_service::list_rooms(&state).await?;
    Ok(Json(rooms))
}
