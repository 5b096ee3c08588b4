//! Application-level configuration loading: hub queues, connection limits and game rules.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GUESS_ROOM_CONFIG_PATH";

#[derive(Debug, Clone, Default)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub hub: HubSettings,
    pub connection: ConnectionSettings,
    pub game: GameSettings,
}

/// Sizing and timing of the room hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSettings {
    /// Capacity of each of the join, leave and broadcast queues.
    pub queue_capacity: usize,
    /// Delay between a departure and the status refresh sent to the room.
    pub leave_status_debounce: Duration,
    /// Delay between a socket upgrade and the first status refresh.
    pub join_status_delay: Duration,
}

/// Limits applied to every client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub outbound_queue_capacity: usize,
    /// Largest inbound frame, in bytes.
    pub max_frame_bytes: usize,
    pub idle_timeout: Duration,
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

/// Game rules and store bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    pub default_capacity: usize,
    pub max_capacity: usize,
    pub min_range: i64,
    pub max_range: i64,
    /// Expiry refreshed on every write of a game record.
    pub record_ttl: Duration,
    /// Upper bound of a single store call.
    pub store_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            leave_status_debounce: Duration::from_millis(100),
            join_status_delay: Duration::from_millis(200),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            max_frame_bytes: 512,
            idle_timeout: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            default_capacity: 5,
            max_capacity: 10,
            min_range: 1,
            max_range: 100,
            record_ttl: Duration::from_secs(3600),
            store_timeout: Duration::from_secs(5),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(config) => {
                    info!(
                        path = %path.display(),
                        queue_capacity = config.hub.queue_capacity,
                        max_capacity = config.game.max_capacity,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; omitted keys keep their default value.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    hub: RawHub,
    connection: RawConnection,
    game: RawGame,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawHub {
    queue_capacity: Option<usize>,
    leave_status_debounce_ms: Option<u64>,
    join_status_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawConnection {
    outbound_queue_capacity: Option<usize>,
    max_frame_bytes: Option<usize>,
    idle_timeout_secs: Option<u64>,
    ping_interval_secs: Option<u64>,
    write_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RawGame {
    default_capacity: Option<usize>,
    max_capacity: Option<usize>,
    min_range: Option<i64>,
    max_range: Option<i64>,
    record_ttl_secs: Option<u64>,
    store_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            hub: value.hub.into(),
            connection: value.connection.into(),
            game: value.game.into(),
        }
    }
}

impl From<RawHub> for HubSettings {
    fn from(value: RawHub) -> Self {
        let defaults = Self::default();
        Self {
            queue_capacity: positive(value.queue_capacity, defaults.queue_capacity),
            leave_status_debounce: value
                .leave_status_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.leave_status_debounce),
            join_status_delay: value
                .join_status_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.join_status_delay),
        }
    }
}

impl From<RawConnection> for ConnectionSettings {
    fn from(value: RawConnection) -> Self {
        let defaults = Self::default();
        let idle_timeout = value
            .idle_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);
        // Keep-alive pings must fire before the peer is considered idle.
        let ping_interval = value
            .ping_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .filter(|interval| *interval < idle_timeout)
            .unwrap_or_else(|| idle_timeout.mul_f64(0.9));
        Self {
            outbound_queue_capacity: positive(
                value.outbound_queue_capacity,
                defaults.outbound_queue_capacity,
            ),
            max_frame_bytes: positive(value.max_frame_bytes, defaults.max_frame_bytes),
            idle_timeout,
            ping_interval,
            write_timeout: value
                .write_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.write_timeout),
        }
    }
}

impl From<RawGame> for GameSettings {
    fn from(value: RawGame) -> Self {
        let defaults = Self::default();
        let max_capacity = positive(value.max_capacity, defaults.max_capacity);
        let default_capacity =
            positive(value.default_capacity, defaults.default_capacity).min(max_capacity);
        let (min_range, max_range) = match (value.min_range, value.max_range) {
            (Some(min), Some(max)) if min <= max => (min, max),
            (None, None) => (defaults.min_range, defaults.max_range),
            (min, max) => {
                warn!(?min, ?max, "invalid guess range in config; using defaults");
                (defaults.min_range, defaults.max_range)
            }
        };
        Self {
            default_capacity,
            max_capacity,
            min_range,
            max_range,
            record_ttl: value
                .record_ttl_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.record_ttl),
            store_timeout: value
                .store_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
        }
    }
}

fn positive(value: Option<usize>, fallback: usize) -> usize {
    value.filter(|v| *v > 0).unwrap_or(fallback)
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
