//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration that tracks all sondes through a proxy on localhost.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, SondeError};
use crate::ingest::source::SourceMode;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream proxy configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// `all` or `single`
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Sonde requested when `mode = "single"`
    #[serde(default)]
    pub sonde_id: String,
}

/// Ingestion schedule and retry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_backoff_step_ms")]
    pub backoff_step_ms: u64,
}

/// Merge engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_activity_timeout_s")]
    pub activity_timeout_s: u64,

    #[serde(default = "default_visibility_window_s")]
    pub visibility_window_s: u64,

    /// Case-insensitive identifier substring; empty accepts every sonde
    #[serde(default)]
    pub id_filter: String,

    #[serde(default = "default_receiver_lat")]
    pub receiver_lat: f64,

    #[serde(default = "default_receiver_lon")]
    pub receiver_lon: f64,
}

/// Snapshot archive configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Application log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stdout only
    #[serde(default)]
    pub file_dir: String,
}

// Default value functions
fn default_base_url() -> String { "http://127.0.0.1:3000".to_string() }
fn default_mode() -> String { "all".to_string() }

fn default_interval_ms() -> u64 { 5000 }
fn default_max_attempts() -> u32 { 3 }
fn default_request_timeout_ms() -> u64 { 30000 }
fn default_backoff_step_ms() -> u64 { 1200 }

fn default_history_limit() -> usize { 600 }
fn default_activity_timeout_s() -> u64 { 900 }
fn default_visibility_window_s() -> u64 { 3600 }
fn default_receiver_lat() -> f64 { 54.352 }
fn default_receiver_lon() -> f64 { 18.646 }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mode: default_mode(),
            sonde_id: String::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            request_timeout_ms: default_request_timeout_ms(),
            backoff_step_ms: default_backoff_step_ms(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            activity_timeout_s: default_activity_timeout_s(),
            visibility_window_s: default_visibility_window_s(),
            id_filter: String::new(),
            receiver_lat: default_receiver_lat(),
            receiver_lon: default_receiver_lon(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_dir: String::new(),
        }
    }
}

impl SourceConfig {
    /// Logical source described by this section
    ///
    /// Only meaningful on a validated configuration.
    pub fn source_mode(&self) -> SourceMode {
        if self.mode == "single" {
            SourceMode::Single(self.sonde_id.trim().to_string())
        } else {
            SourceMode::All
        }
    }
}

impl TrackingConfig {
    /// Identifier filter, or `None` when every sonde is accepted
    pub fn filter(&self) -> Option<String> {
        let filter = self.id_filter.trim();
        (!filter.is_empty()).then(|| filter.to_string())
    }
}

fn invalid(message: impl std::fmt::Display) -> SondeError {
    SondeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sonde_tracker::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Source
        if self.source.base_url.trim().is_empty() {
            return Err(invalid("base_url cannot be empty"));
        }

        if !self.source.base_url.starts_with("http://") && !self.source.base_url.starts_with("https://") {
            return Err(invalid("base_url must start with http:// or https://"));
        }

        match self.source.mode.as_str() {
            "all" => {}
            "single" => {
                if self.source.sonde_id.trim().is_empty() {
                    return Err(invalid("sonde_id cannot be empty when mode is 'single'"));
                }
            }
            _ => return Err(invalid("mode must be one of: all, single")),
        }

        // Ingest timing
        if self.ingest.interval_ms == 0 || self.ingest.interval_ms > 3_600_000 {
            return Err(invalid("interval_ms must be between 1 and 3600000"));
        }

        if self.ingest.max_attempts == 0 || self.ingest.max_attempts > 10 {
            return Err(invalid("max_attempts must be between 1 and 10"));
        }

        if self.ingest.request_timeout_ms == 0 || self.ingest.request_timeout_ms > 120_000 {
            return Err(invalid("request_timeout_ms must be between 1 and 120000"));
        }

        if self.ingest.backoff_step_ms > 60_000 {
            return Err(invalid("backoff_step_ms must be at most 60000"));
        }

        // Tracking
        if self.tracking.history_limit == 0 {
            return Err(invalid("history_limit must be greater than 0"));
        }

        if self.tracking.activity_timeout_s == 0 {
            return Err(invalid("activity_timeout_s must be greater than 0"));
        }

        if self.tracking.visibility_window_s <= self.tracking.activity_timeout_s {
            return Err(invalid("visibility_window_s must be greater than activity_timeout_s"));
        }

        if !(-90.0..=90.0).contains(&self.tracking.receiver_lat) {
            return Err(invalid("receiver_lat must be between -90 and 90"));
        }

        if !(-180.0..=180.0).contains(&self.tracking.receiver_lon) {
            return Err(invalid("receiver_lon must be between -180 and 180"));
        }

        // Telemetry archive
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        // Logging
        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("level must be one of: trace, debug, info, warn, error"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.ingest.interval_ms, 5000);
        assert_eq!(config.tracking.history_limit, 600);
        assert_eq!(config.source.source_mode(), SourceMode::All);
        assert_eq!(config.tracking.filter(), None);
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[source]
base_url = "https://sondes.example.org"
mode = "single"
sonde_id = "T1234567"

[ingest]
interval_ms = 10000

[tracking]
id_filter = " t12 "
receiver_lat = 50.06
receiver_lon = 19.94

[telemetry]

[logging]
level = "debug"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.source.source_mode(), SourceMode::Single("T1234567".to_string()));
        assert_eq!(config.ingest.interval_ms, 10000);
        assert_eq!(config.ingest.max_attempts, 3);
        assert_eq!(config.tracking.filter(), Some("t12".to_string()));
        assert_eq!(config.tracking.receiver_lat, 50.06);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/sonde-tracker.toml");
        assert!(matches!(result, Err(SondeError::Io(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml("[ingest\ninterval_ms = 1");
        assert!(matches!(result, Err(SondeError::Config(_))));
    }

    #[test]
    fn test_empty_base_url() {
        let mut config = create_valid_config();
        config.source.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_without_scheme() {
        let mut config = create_valid_config();
        config.source.base_url = "sondes.example.org".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_mode_requires_id() {
        let mut config = create_valid_config();
        config.source.mode = "single".to_string();
        config.source.sonde_id = "  ".to_string();
        assert!(config.validate().is_err());

        config.source.sonde_id = "T1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_mode() {
        let mut config = create_valid_config();
        config.source.mode = "some".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_interval_zero() {
        let mut config = create_valid_config();
        config.ingest.interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_attempts_bounds() {
        let mut config = create_valid_config();
        config.ingest.max_attempts = 0;
        assert!(config.validate().is_err());
        config.ingest.max_attempts = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_request_timeout_too_high() {
        let mut config = create_valid_config();
        config.ingest.request_timeout_ms = 120_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_step_too_high() {
        let mut config = create_valid_config();
        config.ingest.backoff_step_ms = 60_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_history_limit_zero() {
        let mut config = create_valid_config();
        config.tracking.history_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_visibility_window_must_exceed_activity_timeout() {
        let mut config = create_valid_config();
        config.tracking.visibility_window_s = config.tracking.activity_timeout_s;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_receiver_out_of_range() {
        let mut config = create_valid_config();
        config.tracking.receiver_lat = 91.0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.tracking.receiver_lon = -181.0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.tracking.receiver_lat = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_enabled() {
        let mut config = create_valid_config();
        config.telemetry.enabled = true;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_dir_when_disabled() {
        let mut config = create_valid_config();
        config.telemetry.enabled = false;
        config.telemetry.log_dir = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = create_valid_config();
        config.telemetry.format = "csv".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_base_url(), "http://127.0.0.1:3000");
        assert_eq!(default_mode(), "all");
        assert_eq!(default_interval_ms(), 5000);
        assert_eq!(default_max_attempts(), 3);
        assert_eq!(default_request_timeout_ms(), 30000);
        assert_eq!(default_backoff_step_ms(), 1200);
        assert_eq!(default_history_limit(), 600);
        assert_eq!(default_activity_timeout_s(), 900);
        assert_eq!(default_visibility_window_s(), 3600);
        assert_eq!(default_telemetry_enabled(), false);
        assert_eq!(default_log_dir(), "./logs");
        assert_eq!(default_max_records_per_file(), 10000);
        assert_eq!(default_max_files_to_keep(), 10);
        assert_eq!(default_log_format(), "jsonl");
        assert_eq!(default_log_level(), "info");
    }
}
