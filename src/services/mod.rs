/// Serialized game mutations over the state store.
pub mod coordinator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Builders for room events.
pub mod events;
/// Game creation and inspection for the HTTP API.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
