//! Guess room binary entrypoint wiring REST, WebSocket, game store and result sink layers.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, time::MissedTickBehavior};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use guess_room_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStateStore, memory::MemoryGameStore},
        result_sink::{ResultSink, TracingResultSink},
    },
    routes,
    state::{AppState, SharedState},
};

/// How often the in-memory store drops expired records.
const JANITOR_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = build_store().await?;

    // Nothing from a previous run may survive: rooms start empty.
    let swept = store
        .clear_all()
        .await
        .context("clearing stale game records")?;
    info!(swept, "cleared stale game records");

    let results = build_result_sink().await;
    let app_state = AppState::new(config, store, results);
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the game store: Redis when `REDIS_URL` is set, otherwise in-process memory.
async fn build_store() -> anyhow::Result<Arc<dyn GameStateStore>> {
    #[cfg(feature = "redis-store")]
    {
        use guess_room_back::dao::game_store::redis::{RedisConfig, RedisGameStore};

        if let Some(config) = RedisConfig::from_env() {
            let store = RedisGameStore::connect(&config)
                .await
                .context("connecting to Redis")?;
            info!("using Redis game store");
            return Ok(Arc::new(store));
        }
    }

    info!("using in-memory game store");
    let store = MemoryGameStore::new();
    tokio::spawn(run_memory_janitor(store.clone()));
    Ok(Arc::new(store))
}

/// Pick the result sink: MongoDB when `MONGO_URI` is set, otherwise logs only.
///
/// A sink that cannot be reached degrades to logging; results never block games.
async fn build_result_sink() -> Arc<dyn ResultSink> {
    #[cfg(feature = "mongo-sink")]
    {
        use guess_room_back::dao::result_sink::mongodb::{MongoConfig, MongoResultSink};

        match MongoConfig::from_env().await {
            Ok(Some(config)) => match MongoResultSink::connect(&config).await {
                Ok(sink) => {
                    info!("recording game results to MongoDB");
                    return Arc::new(sink);
                }
                Err(err) => {
                    warn!(error = %err, "MongoDB result sink unavailable; logging results instead");
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "invalid MongoDB configuration; logging results instead");
            }
        }
    }

    Arc::new(TracingResultSink)
}

/// Periodically drop expired records from the in-memory store.
async fn run_memory_janitor(store: MemoryGameStore) {
    let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let purged = store.purge_expired();
        if purged > 0 {
            debug!(purged, "purged expired game records");
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "cannot install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
