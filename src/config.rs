use crate::constants::{
    DEFAULT_LOCK_TTL_SECS, DEFAULT_LOG_DIR, DEFAULT_PORT, DEFAULT_PURGE_INTERVAL_SECS,
    DEFAULT_RESULT_TTL_SECS, MAX_TTL_SECS,
};
use crate::error::ConfigError;
use crate::idempotency::GateSettings;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub idempotency: IdempotencyConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Shared Redis for multi-instance deployments; in-memory when unset
    pub redis_url: Option<String>,
    /// Sweep period for expired in-memory entries
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub result_ttl_secs: u64,
    pub lock_ttl_secs: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            lock_ttl_secs: DEFAULT_LOCK_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose Prometheus text on `GET /metrics`
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ValidationConfig {
    /// JSON Schema for events; the built-in EPCIS rules apply when unset
    pub schema: Option<PathBuf>,
}

impl Config {
    /// Load `config.toml` from the working directory, then apply `.env` and
    /// process environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(DEFAULT_CONFIG_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut config = if path.exists() {
            let content = fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            info!("{} not found, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `CAPTURE_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_var(&lookup, "CAPTURE_PORT")? {
            self.server.port = port;
        }
        if let Some(url) = lookup("CAPTURE_REDIS_URL") {
            self.store.redis_url = Some(url).filter(|u| !u.trim().is_empty());
        }
        if let Some(secs) = parse_var(&lookup, "CAPTURE_PURGE_INTERVAL_SECS")? {
            self.store.purge_interval_secs = secs;
        }
        if let Some(ttl) = parse_var(&lookup, "CAPTURE_RESULT_TTL_SECS")? {
            self.idempotency.result_ttl_secs = ttl;
        }
        if let Some(ttl) = parse_var(&lookup, "CAPTURE_LOCK_TTL_SECS")? {
            self.idempotency.lock_ttl_secs = ttl;
        }
        if let Some(dir) = lookup("CAPTURE_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Some(enabled) = parse_var(&lookup, "CAPTURE_METRICS_ENABLED")? {
            self.metrics.enabled = enabled;
        }
        if let Some(schema) = lookup("CAPTURE_EVENT_SCHEMA") {
            self.validation.schema = Some(PathBuf::from(schema));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_ttl("idempotency.result_ttl_secs", self.idempotency.result_ttl_secs)?;
        check_ttl("idempotency.lock_ttl_secs", self.idempotency.lock_ttl_secs)?;
        if self.store.purge_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "store.purge_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.idempotency.lock_ttl_secs > self.idempotency.result_ttl_secs {
            warn!(
                "Lock TTL ({}s) exceeds result TTL ({}s)",
                self.idempotency.lock_ttl_secs, self.idempotency.result_ttl_secs
            );
        }
        Ok(())
    }

    pub fn gate_settings(&self) -> GateSettings {
        GateSettings {
            result_ttl_secs: self.idempotency.result_ttl_secs,
            lock_ttl_secs: self.idempotency.lock_ttl_secs,
        }
    }
}

fn check_ttl(name: &str, secs: u64) -> Result<(), ConfigError> {
    if secs == 0 || secs > MAX_TTL_SECS {
        return Err(ConfigError::Invalid(format!(
            "{name} must be between 1 and {MAX_TTL_SECS} seconds, got {secs}"
        )));
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::Invalid(format!("Invalid {key} value '{raw}': {e}"))),
    }
}
