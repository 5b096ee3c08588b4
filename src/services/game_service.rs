use rand::{Rng, distr::Alphanumeric};
use tracing::{info, warn};

use crate::{
    dto::game::{CreateGameRequest, CreateGameResponse, GameView, RoomSummary, sorted_rooms},
    error::{AppError, GameError},
    state::SharedState,
};

const GAME_ID_LENGTH: usize = 9;
const MAX_ID_ATTEMPTS: usize = 3;

/// Open a new game under a fresh identifier and seat its creator.
pub async fn create_game(
    state: &SharedState,
    request: CreateGameRequest,
) -> Result<CreateGameResponse, AppError> {
    let coordinator = state.coordinator();
    let capacity = request
        .capacity
        .unwrap_or(coordinator.settings().default_capacity);

    let mut attempts = 0;
    let game_id = loop {
        attempts += 1;
        let candidate = generate_game_id();
        match coordinator.create_game(&candidate, capacity).await {
            Ok(_) => break candidate,
            Err(GameError::WrongState(_)) if attempts < MAX_ID_ATTEMPTS => {
                warn!(game_id = %candidate, "generated game id already in use; retrying");
            }
            Err(err) => return Err(err.into()),
        }
    };

    let game = coordinator
        .add_player(&game_id, &request.player_id, request.player_name.trim())
        .await?;
    info!(%game_id, player_id = %request.player_id, capacity, "game opened");

    Ok(CreateGameResponse {
        game_id,
        game: GameView::from(&game),
    })
}

/// Current view of a game.
pub async fn game_status(state: &SharedState, game_id: &str) -> Result<GameView, AppError> {
    let game = state.coordinator().status(game_id).await?;
    Ok(GameView::from(&game))
}

/// Rooms currently tracked by the hub.
pub async fn list_rooms(state: &SharedState) -> Result<Vec<RoomSummary>, AppError> {
    let rooms = state
        .hub()
        .rooms()
        .await
        .map_err(|err| AppError::ServiceUnavailable(err.to_string()))?;
    Ok(sorted_rooms(rooms))
}

fn generate_game_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(GAME_ID_LENGTH)
        .map(char::from)
        .collect()
}
