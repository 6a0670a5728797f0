//! Configuration management for postcode-sweep.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/postcode-sweep/config.toml` (or platform
/// equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Request pacing and retry settings
    pub scanning: ScanningConfig,
    /// Registry endpoint settings
    pub registry: RegistryConfig,
    /// Output locations and record field names
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from the default location, falling back to defaults
    /// if the file does not exist.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path.
    ///
    /// Unlike [`AppConfig::load`], a missing file is an error.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `SWEEP_DATA_DIR`: Override the raw record directory
    /// - `SWEEP_MAX_CONCURRENT`: Override the number of in-flight fetches
    /// - `SWEEP_DELAY_MIN_MS` / `SWEEP_DELAY_MAX_MS`: Override request jitter
    /// - `SWEEP_MAX_RETRIES`: Override the attempt budget per key
    pub fn with_env_overrides(mut self) -> ConfigResult<Self> {
        if let Ok(val) = std::env::var("SWEEP_DATA_DIR") {
            tracing::debug!("Override storage.data_dir from env: {}", val);
            self.storage.data_dir = PathBuf::from(val);
        }

        if let Some(max) = env_parse("SWEEP_MAX_CONCURRENT") {
            self.scanning.max_concurrent_fetches = max;
            tracing::debug!("Override max_concurrent_fetches from env: {}", max);
        }

        if let Some(ms) = env_parse("SWEEP_DELAY_MIN_MS") {
            self.scanning.delay_min_ms = ms;
            tracing::debug!("Override delay_min_ms from env: {}", ms);
        }

        if let Some(ms) = env_parse("SWEEP_DELAY_MAX_MS") {
            self.scanning.delay_max_ms = ms;
            tracing::debug!("Override delay_max_ms from env: {}", ms);
        }

        if let Some(retries) = env_parse("SWEEP_MAX_RETRIES") {
            self.scanning.max_retries = retries;
            tracing::debug!("Override max_retries from env: {}", retries);
        }

        self.validate()?;
        Ok(self)
    }

    /// Load from the default location and apply environment overrides.
    pub fn load_with_env() -> ConfigResult<Self> {
        Self::load()?.with_env_overrides()
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ConfigResult<()> {
        let scanning = &self.scanning;
        if scanning.delay_min_ms > scanning.delay_max_ms {
            return Err(ConfigError::InvalidValue {
                field: "scanning.delay_min_ms".to_string(),
                reason: format!(
                    "{} is greater than delay_max_ms {}",
                    scanning.delay_min_ms, scanning.delay_max_ms
                ),
            });
        }
        if scanning.max_concurrent_fetches == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.max_concurrent_fetches".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if scanning.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanning.max_retries".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/postcode-sweep/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "postcode-sweep", "postcode-sweep")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|val| val.parse().ok())
}

/// Request pacing and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// Lower bound of the random pause before each request, in milliseconds
    pub delay_min_ms: u64,
    /// Upper bound of the random pause before each request, in milliseconds
    pub delay_max_ms: u64,
    /// Attempts per key before giving up
    pub max_retries: u32,
    /// First backoff delay in milliseconds, doubled after every failure
    pub initial_backoff_ms: u64,
    /// Number of keys fetched concurrently (1 = strictly sequential)
    pub max_concurrent_fetches: usize,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// User agent string
    pub user_agent: String,
}

impl ScanningConfig {
    /// Jitter range as durations.
    #[must_use]
    pub fn delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.delay_min_ms),
            Duration::from_millis(self.delay_max_ms),
        )
    }

    /// First backoff delay.
    #[must_use]
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            delay_min_ms: 2000,
            delay_max_ms: 5000,
            max_retries: 5,
            initial_backoff_ms: 2000,
            max_concurrent_fetches: 1,
            timeout_secs: 30,
            user_agent: "postcode-sweep/0.1.0 (+https://github.com/postcode-sweep/postcode-sweep)"
                .to_string(),
        }
    }
}

/// Registry endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry origin
    pub base_url: String,
    /// Page fetched once per key to establish session cookies
    pub session_path: String,
    /// Form-encoded search endpoint
    pub search_path: String,
    /// Whether inactive registrants are included
    pub include_inactive: bool,
    /// Specialty sent with `Specialist` searches
    pub specialist_type: String,
}

impl RegistryConfig {
    /// Full URL of the session page.
    #[must_use]
    pub fn session_url(&self) -> String {
        join_url(&self.base_url, &self.session_path)
    }

    /// Full URL of the search endpoint.
    #[must_use]
    pub fn search_url(&self) -> String {
        join_url(&self.base_url, &self.search_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://register.cpso.on.ca".to_string(),
            session_path: "/Advanced-Search/".to_string(),
            search_path: "/Get-Search-Results/".to_string(),
            include_inactive: true,
            specialist_type: "Psychiatry".to_string(),
        }
    }
}

/// Output locations and record field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the raw record store
    pub data_dir: PathBuf,
    /// Directory holding `FSA_LDU{n}.json` key-set files
    pub criteria_dir: PathBuf,
    /// Directory receiving `summary.csv` and `details.csv`
    pub results_dir: PathBuf,
    /// Unique identifier field of a detail record
    pub id_field: String,
    /// Detail fields normalised as phone numbers
    pub phone_fields: Vec<String>,
    /// Value written for phone fields that cannot be normalised
    pub unformattable_marker: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            criteria_dir: PathBuf::from("data/search-criteria"),
            results_dir: PathBuf::from("results"),
            id_field: "cpsonumber".to_string(),
            phone_fields: vec!["phonenumber".to_string(), "fax".to_string()],
            unformattable_marker: "UNFORMATTABLE".to_string(),
        }
    }
}
