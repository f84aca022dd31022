//! Pipeline configuration from environment variables

use super::accumulator::SyncMode;
use super::registry::RegistryOptions;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Rotation interval used when `MODE_DEMO` is enabled
pub const DEMO_TICK_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for the sensorflow runtime
///
/// Loaded from environment variables with sensible defaults. Everything here
/// is fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// UDP address readings arrive on
    pub data_addr: SocketAddr,

    /// TCP address of the HTTP control panel
    pub control_addr: SocketAddr,

    /// Buckets kept per source (7 = one week of daily buckets)
    pub window_size: usize,

    /// Time between rotations
    pub tick_interval: Duration,

    /// Accumulator synchronization policy
    pub sync_mode: SyncMode,

    /// Optional ceiling on distinct sources (unbounded when `None`)
    pub max_sources: Option<usize>,

    /// Demo mode: short rotation interval and built-in sensor mock
    pub demo: bool,

    /// Number of simulated sensors in demo mode
    pub mock_sensors: usize,

    /// Send interval of the simulated sensors
    pub mock_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_addr: SocketAddr::from(([0, 0, 0, 0], 8093)),
            control_addr: SocketAddr::from(([0, 0, 0, 0], 8093)),
            window_size: 7,
            tick_interval: Duration::from_secs(24 * 60 * 60),
            sync_mode: SyncMode::Locked,
            max_sources: None,
            demo: false,
            mock_sensors: 40,
            mock_interval: Duration::from_millis(1_000),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SENSORFLOW_DATA_ADDR` (default: 0.0.0.0:8093, UDP)
    /// - `SENSORFLOW_CONTROL_ADDR` (default: 0.0.0.0:8093, TCP)
    /// - `SENSORFLOW_WINDOW_SIZE` (default: 7)
    /// - `SENSORFLOW_TICK_INTERVAL_SECS` (default: 86400)
    /// - `SENSORFLOW_SYNC_MODE` (default: locked; or best-effort)
    /// - `SENSORFLOW_MAX_SOURCES` (default: unbounded)
    /// - `MODE_DEMO` (default: false; forces a 2s rotation and starts the mock)
    /// - `SENSORFLOW_MOCK_SENSORS` (default: 40)
    /// - `SENSORFLOW_MOCK_INTERVAL_MS` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mut config = Self {
            data_addr: parse_or(&lookup, "SENSORFLOW_DATA_ADDR", defaults.data_addr)?,
            control_addr: parse_or(&lookup, "SENSORFLOW_CONTROL_ADDR", defaults.control_addr)?,
            window_size: parse_or(&lookup, "SENSORFLOW_WINDOW_SIZE", defaults.window_size)?,
            tick_interval: Duration::from_secs(parse_or(
                &lookup,
                "SENSORFLOW_TICK_INTERVAL_SECS",
                defaults.tick_interval.as_secs(),
            )?),
            sync_mode: match lookup("SENSORFLOW_SYNC_MODE") {
                Some(raw) => SyncMode::parse(&raw).ok_or_else(|| {
                    ConfigError::InvalidValue(format!(
                        "SENSORFLOW_SYNC_MODE must be 'locked' or 'best-effort', got '{}'",
                        raw
                    ))
                })?,
                None => defaults.sync_mode,
            },
            max_sources: match lookup("SENSORFLOW_MAX_SOURCES") {
                Some(raw) if !raw.trim().is_empty() => Some(parse_value("SENSORFLOW_MAX_SOURCES", &raw)?),
                _ => None,
            },
            demo: lookup("MODE_DEMO")
                .map(|raw| parse_bool(&raw))
                .unwrap_or(defaults.demo),
            mock_sensors: parse_or(&lookup, "SENSORFLOW_MOCK_SENSORS", defaults.mock_sensors)?,
            mock_interval: Duration::from_millis(parse_or(
                &lookup,
                "SENSORFLOW_MOCK_INTERVAL_MS",
                defaults.mock_interval.as_millis() as u64,
            )?),
        };

        if config.demo {
            config.tick_interval = DEMO_TICK_INTERVAL;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::InvalidValue(
                "SENSORFLOW_WINDOW_SIZE must be at least 1".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SENSORFLOW_TICK_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.max_sources == Some(0) {
            return Err(ConfigError::InvalidValue(
                "SENSORFLOW_MAX_SOURCES must be at least 1 when set".to_string(),
            ));
        }
        if self.demo && self.mock_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "SENSORFLOW_MOCK_INTERVAL_MS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            window_size: self.window_size,
            sync_mode: self.sync_mode,
            max_sources: self.max_sources,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(format!("{}='{}'", key, raw)))
}

// Unparseable booleans fall back to false
fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "t" | "yes" | "on"
    )
}
