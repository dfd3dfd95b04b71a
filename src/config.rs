// Configuration management for the grid engine

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Strategy parameters consumed by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub trading_pair: String,
    pub grid_count: usize,
    pub order_size: Decimal,
    pub max_position_size: Decimal,
    pub price_range_percent: Decimal,
    pub stop_loss_percent: Decimal,
    pub check_interval_secs: u64,
    #[serde(default)]
    pub disable_stop_loss: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            trading_pair: "ETH".to_string(),
            grid_count: 10,
            order_size: dec!(0.01),
            max_position_size: dec!(0.1),
            price_range_percent: dec!(5.0),
            stop_loss_percent: dec!(10.0),
            check_interval_secs: 5,
            disable_stop_loss: false,
        }
    }
}

impl GridConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

/// Pacing and timeouts for venue I/O
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub status_batch_size: usize,
    pub order_pacing_ms: u64,
    pub status_pacing_ms: u64,
    pub venue_timeout_ms: u64,
    pub max_drain_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            status_batch_size: 10,
            order_pacing_ms: 100,
            status_pacing_ms: 50,
            venue_timeout_ms: 10_000,
            max_drain_secs: 30,
        }
    }
}

impl EngineConfig {
    /// No pacing delays; used by tests and simulations that drive ticks by hand.
    pub fn unpaced() -> Self {
        Self {
            order_pacing_ms: 0,
            status_pacing_ms: 0,
            ..Self::default()
        }
    }

    pub fn order_pacing(&self) -> Duration {
        Duration::from_millis(self.order_pacing_ms)
    }

    pub fn status_pacing(&self) -> Duration {
        Duration::from_millis(self.status_pacing_ms)
    }

    pub fn venue_timeout(&self) -> Duration {
        Duration::from_millis(self.venue_timeout_ms)
    }

    pub fn max_drain(&self) -> Duration {
        Duration::from_secs(self.max_drain_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub log_to_file: bool,
    pub log_dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_file: false,
            log_dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub grid: GridConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let mut config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }

    /// Override file values from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override file values from `lookup`, keyed by the upper-case names
    /// `TRADING_PAIR`, `GRID_COUNT`, `ORDER_SIZE`, `MAX_POSITION_SIZE`,
    /// `PRICE_RANGE_PERCENT`, `STOP_LOSS_PERCENT`, `CHECK_INTERVAL`,
    /// `LOG_LEVEL` and `LOG_TO_FILE`. Unset keys leave the value alone.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let grid = &mut self.grid;
        if let Some(pair) = lookup("TRADING_PAIR") {
            grid.trading_pair = pair;
        }
        if let Some(value) = lookup("GRID_COUNT") {
            grid.grid_count = parse_override("GRID_COUNT", &value)?;
        }
        if let Some(value) = lookup("ORDER_SIZE") {
            grid.order_size = parse_override("ORDER_SIZE", &value)?;
        }
        if let Some(value) = lookup("MAX_POSITION_SIZE") {
            grid.max_position_size = parse_override("MAX_POSITION_SIZE", &value)?;
        }
        if let Some(value) = lookup("PRICE_RANGE_PERCENT") {
            grid.price_range_percent = parse_override("PRICE_RANGE_PERCENT", &value)?;
        }
        if let Some(value) = lookup("STOP_LOSS_PERCENT") {
            grid.stop_loss_percent = parse_override("STOP_LOSS_PERCENT", &value)?;
        }
        if let Some(value) = lookup("CHECK_INTERVAL") {
            grid.check_interval_secs = parse_override("CHECK_INTERVAL", &value)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if let Some(value) = lookup("LOG_TO_FILE") {
            self.logging.log_to_file = value.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let grid = &self.grid;

        if grid.trading_pair.trim().is_empty() {
            return Err(ConfigError::Validation("trading_pair must be set".to_string()));
        }

        if grid.grid_count == 0 {
            return Err(ConfigError::Validation("grid_count must be greater than 0".to_string()));
        }

        if grid.order_size <= Decimal::ZERO {
            return Err(ConfigError::Validation("order_size must be positive".to_string()));
        }

        if grid.max_position_size < Decimal::ZERO {
            return Err(ConfigError::Validation(
                "max_position_size must be non-negative".to_string(),
            ));
        }

        if grid.price_range_percent <= Decimal::ZERO || grid.price_range_percent >= dec!(100) {
            return Err(ConfigError::Validation(
                "price_range_percent must be between 0 and 100 (exclusive)".to_string(),
            ));
        }

        if grid.stop_loss_percent <= Decimal::ZERO {
            return Err(ConfigError::Validation("stop_loss_percent must be positive".to_string()));
        }

        if grid.check_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "check_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.engine.status_batch_size == 0 {
            return Err(ConfigError::Validation(
                "status_batch_size must be greater than 0".to_string(),
            ));
        }

        if self.engine.venue_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "venue_timeout_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_override<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::Parse(format!("{}={:?}: {}", key, value, e)))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
