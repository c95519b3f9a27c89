#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Configuration for the sound map services.
//!
//! Settings are layered:
//!
//! 1. **Built-in defaults** embedded at compile time from
//!    `defaults/soundmap.toml`.
//! 2. **Override file** named by the `SOUNDMAP_CONFIG` environment variable.
//!    Only the keys present in the file replace the defaults, so a file
//!    containing just `[scoring]\nfloor = 2.0` is valid.
//! 3. **Environment variables** for deployment-specific values:
//!    `OVERPASS_URL`, `NOMINATIM_URL`, `SOUNDMAP_USER_AGENT`, `BIND_ADDR`,
//!    and `PORT`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use soundmap_models::HeatmapDisplay;
use thiserror::Error;

const DEFAULT_TOML: &str = include_str!("../defaults/soundmap.toml");

/// Environment variable naming the override file.
pub const CONFIG_PATH_ENV: &str = "SOUNDMAP_CONFIG";

/// Largest supported cache key precision. Nine decimal places still fits
/// a longitude in an `i64` fixed-point value with plenty of headroom.
pub const MAX_KEY_PRECISION: u32 = 9;

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Override file could not be read.
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// TOML did not parse or did not match the expected shape.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override held an unusable value.
    #[error("Invalid value for {name}: {value:?}")]
    Env {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A value parsed but is outside its valid range.
    #[error("Invalid config value for {key}: {message}")]
    Invalid {
        /// Dotted key path, e.g. `"scoring.floor"`.
        key: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Overpass API settings.
    pub overpass: OverpassConfig,
    /// Nominatim search settings.
    pub nominatim: NominatimConfig,
    /// Sound level estimation constants.
    pub scoring: ScoringConfig,
    /// Score cache sizing.
    pub cache: CacheConfig,
    /// Region-change handling.
    pub refresh: RefreshConfig,
    /// Renderer settings passed through with every layer.
    pub heatmap: HeatmapDisplay,
    /// HTTP server binding.
    pub server: ServerConfig,
}

/// Overpass API client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassConfig {
    /// Interpreter endpoint.
    pub base_url: String,
    /// Per-request timeout; also sent to Overpass as the query timeout.
    pub timeout_secs: u64,
    /// Retries for rate limiting, server errors, and dropped connections.
    #[serde(default)]
    pub max_retries: u32,
    /// Maximum buildings returned by one building query.
    pub max_buildings: u32,
    /// Radius around each building anchor in which roads are counted.
    pub road_radius_m: u32,
}

impl OverpassConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Nominatim forward-geocoding settings.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimConfig {
    /// Search endpoint.
    pub base_url: String,
    /// Descriptive client identification required by the Nominatim usage
    /// policy.
    pub user_agent: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl NominatimConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Constants of the road-count sound level formula.
///
/// `score = road_count * weight_factor`; any score at or below `floor`
/// becomes exactly 0, and a configured `ceiling` caps the result.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScoringConfig {
    /// Weight per counted road segment.
    pub weight_factor: f64,
    /// Scores at or below this value collapse to 0.
    pub floor: f64,
    /// Upper bound on the score, if any.
    #[serde(default)]
    pub ceiling: Option<f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weight_factor: 0.5,
            floor: 1.0,
            ceiling: None,
        }
    }
}

/// Score cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached scores before least-recently-used eviction.
    pub max_capacity: u64,
    /// Entry lifetime in seconds; `0` keeps entries until evicted by size.
    #[serde(default)]
    pub time_to_live_secs: u64,
    /// Decimal places kept (by truncation) when keying a coordinate.
    pub key_precision: u32,
}

impl CacheConfig {
    /// Entry lifetime, `None` when disabled.
    #[must_use]
    pub const fn time_to_live(&self) -> Option<Duration> {
        if self.time_to_live_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.time_to_live_secs))
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live_secs: 0,
            key_precision: 7,
        }
    }
}

/// Region-change handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RefreshConfig {
    /// Quiet period after a region change before fetching.
    pub debounce_ms: u64,
    /// Substitute placeholder points when a region has no buildings.
    #[serde(default = "default_true")]
    pub placeholder: bool,
    /// Map sessions tracked at once; the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: u64,
    /// Idle time after which a session's layer is forgotten. `0` keeps
    /// sessions until evicted by size.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

impl RefreshConfig {
    /// Debounce window as a [`Duration`].
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Session idle expiry, or `None` when disabled.
    #[must_use]
    pub const fn session_idle(&self) -> Option<Duration> {
        if self.session_idle_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.session_idle_secs))
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            placeholder: true,
            max_sessions: default_max_sessions(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    pub bind_addr: String,
    /// Port to bind.
    pub port: u16,
}

const fn default_true() -> bool {
    true
}

const fn default_max_sessions() -> u64 {
    1000
}

const fn default_session_idle_secs() -> u64 {
    3600
}

impl AppConfig {
    /// Returns the built-in defaults.
    ///
    /// # Panics
    ///
    /// Panics if the embedded defaults are malformed (this is a compile-time
    /// guarantee since the file is embedded and covered by tests).
    #[must_use]
    pub fn defaults() -> Self {
        toml::from_str(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse built-in config defaults: {e}"))
    }

    /// Loads defaults, the `SOUNDMAP_CONFIG` override file if set, and
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the override file cannot be read or parsed,
    /// an environment override is malformed, or a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_with(path.as_deref(), |name| std::env::var(name).ok())
    }

    /// Same as [`Self::load`] with an explicit override file and environment
    /// lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let overrides = match path {
            Some(path) => {
                log::info!("Loading config overrides from {}", path.display());
                Some(
                    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                        path: path.to_path_buf(),
                        source,
                    })?,
                )
            }
            None => None,
        };

        let mut config = Self::from_toml_layers(overrides.as_deref())?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Merges an optional override document onto the built-in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if either document is invalid.
    pub fn from_toml_layers(overrides: Option<&str>) -> Result<Self, ConfigError> {
        let mut base: toml::Table = toml::from_str(DEFAULT_TOML)?;
        if let Some(text) = overrides {
            let layer: toml::Table = toml::from_str(text)?;
            merge_tables(&mut base, layer);
        }
        Ok(toml::Value::Table(base).try_into()?)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = env("OVERPASS_URL") {
            self.overpass.base_url = url;
        }
        if let Some(url) = env("NOMINATIM_URL") {
            self.nominatim.base_url = url;
        }
        if let Some(agent) = env("SOUNDMAP_USER_AGENT") {
            self.nominatim.user_agent = agent;
        }
        if let Some(addr) = env("BIND_ADDR") {
            self.server.bind_addr = addr;
        }
        if let Some(port) = env("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Env {
                name: "PORT",
                value: port,
            })?;
        }
        Ok(())
    }

    /// Checks ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scoring = &self.scoring;
        if !scoring.weight_factor.is_finite() || scoring.weight_factor < 0.0 {
            return Err(invalid("scoring.weight_factor", "must be a non-negative number"));
        }
        if !scoring.floor.is_finite() || scoring.floor < 0.0 {
            return Err(invalid("scoring.floor", "must be a non-negative number"));
        }
        if scoring
            .ceiling
            .is_some_and(|ceiling| !ceiling.is_finite() || ceiling <= scoring.floor)
        {
            return Err(invalid("scoring.ceiling", "must be greater than scoring.floor"));
        }
        if self.cache.key_precision > MAX_KEY_PRECISION {
            return Err(invalid(
                "cache.key_precision",
                format!("must be at most {MAX_KEY_PRECISION}"),
            ));
        }
        if self.cache.max_capacity == 0 {
            return Err(invalid("cache.max_capacity", "must be positive"));
        }
        if self.overpass.max_buildings == 0 {
            return Err(invalid("overpass.max_buildings", "must be positive"));
        }
        if self.overpass.timeout_secs == 0 {
            return Err(invalid("overpass.timeout_secs", "must be positive"));
        }
        if self.refresh.max_sessions == 0 {
            return Err(invalid("refresh.max_sessions", "must be positive"));
        }
        if self.nominatim.timeout_secs == 0 {
            return Err(invalid("nominatim.timeout_secs", "must be positive"));
        }
        if self.nominatim.user_agent.trim().is_empty() {
            return Err(invalid("nominatim.user_agent", "must not be empty"));
        }
        let gradient = &self.heatmap.gradient;
        if gradient.colors.len() != gradient.start_points.len() {
            return Err(invalid(
                "heatmap.gradient",
                "colors and startPoints must have the same length",
            ));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.into(),
    }
}

/// Recursively overlays `layer` onto `base`. Tables merge key by key; any
/// other value replaces the base value outright.
fn merge_tables(base: &mut toml::Table, layer: toml::Table) {
    for (key, value) in layer {
        let toml::Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}
