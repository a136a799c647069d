//! # Tillpoint Configuration
//!
//! Settings for the transaction core: database, reservation lifetime,
//! promotion refresh, return window and tax.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILLPOINT_DB_PATH=/var/lib/tillpoint/pos.db                        │
//! │     TILLPOINT_TAX_RATE_BPS=825                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tillpoint/pos.toml (Linux)                               │
//! │     ~/Library/Application Support/com.tillpoint.pos/pos.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/tillpoint/pos.db"
//! max_connections = 5
//!
//! [reservations]
//! ttl_minutes = 15
//! sweep_interval_secs = 180
//!
//! [promotions]
//! refresh_interval_secs = 120
//! channel = "in_store"
//!
//! [returns]
//! window_days = 7
//!
//! [pricing]
//! tax_rate_bps = 0
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pool::DbConfig;
use tillpoint_core::returns::ReturnPolicy;
use tillpoint_core::validation::validate_tax_rate_bps;
use tillpoint_core::{
    Channel, TaxRate, DEFAULT_PROMOTION_REFRESH_SECS, DEFAULT_RESERVATION_TTL_MINUTES,
    DEFAULT_RETURN_WINDOW_DAYS,
};

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save config: {0}")]
    SaveFailed(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Wait for a free pooled connection (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Wait on a locked database before failing a write (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("com", "tillpoint", "pos")
        .map(|dirs| dirs.data_dir().join("tillpoint.db"))
        .unwrap_or_else(|| PathBuf::from("tillpoint.db"))
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_busy_timeout() -> u64 {
    5000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

impl DatabaseSettings {
    /// Builds the pool configuration.
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.path.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

// =============================================================================
// Reservation Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationSettings {
    /// Hold lifetime, measured from the last update.
    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: i64,

    /// Interval between expired-hold sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_minutes() -> i64 {
    DEFAULT_RESERVATION_TTL_MINUTES
}

fn default_sweep_interval() -> u64 {
    180
}

impl Default for ReservationSettings {
    fn default() -> Self {
        ReservationSettings {
            ttl_minutes: default_ttl_minutes(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl ReservationSettings {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.ttl_minutes)
    }
}

// =============================================================================
// Promotion Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionSettings {
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,

    /// Channel this till prices for.
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

fn default_refresh_interval() -> u64 {
    DEFAULT_PROMOTION_REFRESH_SECS
}

fn default_channel() -> Channel {
    Channel::InStore
}

impl Default for PromotionSettings {
    fn default() -> Self {
        PromotionSettings {
            refresh_interval_secs: default_refresh_interval(),
            channel: default_channel(),
        }
    }
}

// =============================================================================
// Return & Pricing Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnSettings {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_window_days() -> i64 {
    DEFAULT_RETURN_WINDOW_DAYS
}

impl Default for ReturnSettings {
    fn default() -> Self {
        ReturnSettings {
            window_days: default_window_days(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Sales tax in basis points (825 = 8.25%).
    #[serde(default)]
    pub tax_rate_bps: u32,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete transaction core configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub reservations: ReservationSettings,

    #[serde(default)]
    pub promotions: PromotionSettings,

    #[serde(default)]
    pub returns: ReturnSettings,

    #[serde(default)]
    pub pricing: PricingSettings,
}

impl PosConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (pos.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be greater than 0".into(),
            ));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid(
                "database.min_connections must not exceed max_connections".into(),
            ));
        }
        if self.reservations.ttl_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "reservations.ttl_minutes must be greater than 0".into(),
            ));
        }
        if self.reservations.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "reservations.sweep_interval_secs must be greater than 0".into(),
            ));
        }
        if self.promotions.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "promotions.refresh_interval_secs must be greater than 0".into(),
            ));
        }
        if self.returns.window_days < 0 {
            return Err(ConfigError::Invalid(
                "returns.window_days must not be negative".into(),
            ));
        }
        validate_tax_rate_bps(self.pricing.tax_rate_bps)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TILLPOINT_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("TILLPOINT_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Ok(ttl) = std::env::var("TILLPOINT_RESERVATION_TTL_MINUTES") {
            if let Ok(minutes) = ttl.parse::<i64>() {
                debug!(minutes, "Overriding reservation TTL from environment");
                self.reservations.ttl_minutes = minutes;
            }
        }

        if let Ok(secs) = std::env::var("TILLPOINT_SWEEP_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.reservations.sweep_interval_secs = s;
            }
        }

        if let Ok(secs) = std::env::var("TILLPOINT_PROMOTION_REFRESH_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.promotions.refresh_interval_secs = s;
            }
        }

        if let Ok(channel) = std::env::var("TILLPOINT_CHANNEL") {
            match channel.to_lowercase().as_str() {
                "in_store" | "instore" => self.promotions.channel = Channel::InStore,
                "online" => self.promotions.channel = Channel::Online,
                "both" => self.promotions.channel = Channel::Both,
                _ => warn!(channel = %channel, "Unknown sale channel in environment"),
            }
        }

        if let Ok(days) = std::env::var("TILLPOINT_RETURN_WINDOW_DAYS") {
            if let Ok(d) = days.parse::<i64>() {
                self.returns.window_days = d;
            }
        }

        if let Ok(bps) = std::env::var("TILLPOINT_TAX_RATE_BPS") {
            if let Ok(b) = bps.parse::<u32>() {
                debug!(bps = b, "Overriding tax rate from environment");
                self.pricing.tax_rate_bps = b;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tillpoint", "pos")
            .map(|dirs| dirs.config_dir().join("pos.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.pricing.tax_rate_bps)
    }

    pub fn return_policy(&self) -> ReturnPolicy {
        ReturnPolicy::new(self.returns.window_days)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.reservations.sweep_interval_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.promotions.refresh_interval_secs)
    }
}
