use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the guess room backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::game::create_game,
        crate::routes::game::get_game,
        crate::routes::game::list_rooms,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::game::CreateGameRequest,
            crate::dto::game::CreateGameResponse,
            crate::dto::game::GameView,
            crate::dto::game::PlayerScore,
            crate::dto::game::RoomSummary,
            crate::dto::ws::InboundEnvelope,
            crate::dto::ws::EventEnvelope,
            crate::dto::ws::EventKind,
            crate::dto::ws::PlayerSummary,
            crate::dto::ws::GameInfo,
            crate::state::game::GameStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "game", description = "Game creation and inspection"),
        (name = "rooms", description = "WebSocket rooms and their diagnostics"),
    )
)]
pub struct ApiDoc;
