pub mod connection;
pub mod game;
pub mod hub;
pub mod room;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::{game_store::GameStateStore, result_sink::ResultSink},
    services::coordinator::GameCoordinator,
};

use self::hub::{Hub, HubHandle};

pub type SharedState = Arc<AppState>;

/// Dependencies shared by every request and connection, built once at startup.
pub struct AppState {
    config: Arc<AppConfig>,
    coordinator: Arc<GameCoordinator>,
    hub: HubHandle,
    results: Arc<dyn ResultSink>,
}

impl AppState {
    /// Build the coordinator over `store` and start the room hub.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: AppConfig,
        store: Arc<dyn GameStateStore>,
        results: Arc<dyn ResultSink>,
    ) -> SharedState {
        let coordinator = Arc::new(GameCoordinator::new(store, config.game.clone()));
        let hub = Hub::spawn(config.hub.clone(), coordinator.clone());
        Arc::new(Self {
            config: Arc::new(config),
            coordinator,
            hub,
            results,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    pub fn coordinator(&self) -> &GameCoordinator {
        &self.coordinator
    }

    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    pub fn results(&self) -> Arc<dyn ResultSink> {
        self.results.clone()
    }
}
