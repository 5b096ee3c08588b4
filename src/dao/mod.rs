/// Game state storage backends.
pub mod game_store;
/// Persisted record shapes.
pub mod models;
/// Sinks receiving the outcome of finished rounds.
pub mod result_sink;
/// Backend-agnostic storage errors.
pub mod storage;
