//! Configuration loading
//!
//! Layers, lowest priority first: embedded defaults, `config/local.toml`,
//! `XFERCHECK_<SECTION>__<KEY>` variables, then the legacy flat variables
//! the service has always honored.

use config::{Config, Environment, File, FileFormat};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use xfer_core::{PatternError, PatternTable, PipelineSettings};

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Legacy variable → config key.
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("RATE_LIMIT_PER_MINUTE", "rate_limit.per_window"),
    ("GOOGLE_SHEETS_SPREADSHEET_ID", "sheets.spreadsheet_id"),
    ("GOOGLE_SHEETS_SHEET_NAME", "sheets.sheet_name"),
    ("GOOGLE_SHEETS_METRICS_SHEET_NAME", "sheets.metrics_sheet_name"),
    ("GOOGLE_SHEETS_ACCESS_TOKEN", "sheets.access_token"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("classifier.{}_pattern is not a valid pattern: {}", .0.vocabulary, .0.source)]
    InvalidPattern(#[from] PatternError),

    #[error("rate_limit.{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("probe.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("server.bind '{0}' is not a socket address")]
    InvalidBind(String),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub probe: ProbeConfig,
    pub classifier: ClassifierConfig,
    pub sheets: SheetsConfig,
    pub logging: LoggingConfig,
    /// Compiled from `classifier` while loading.
    #[serde(skip)]
    patterns: Arc<PatternTable>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitConfig {
    pub per_window: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ProbeConfig {
    pub connect_timeout_secs: u64,
    pub session_timeout_secs: u64,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierConfig {
    pub ftp_auth_pattern: String,
    pub sftp_auth_pattern: String,
}

#[derive(Debug, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub spreadsheet_id: String,
    pub sheet_name: String,
    pub metrics_sheet_name: String,
    pub access_token: SecretString,
}

impl SheetsConfig {
    /// Enabled and carrying everything a request needs.
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.spreadsheet_id.trim().is_empty() && !self.access_token.expose_secret().is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
    pub level: String,
}

impl AppConfig {
    /// Check the values that would otherwise fail on first use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.rate_limit.per_window == 0 {
            return Err(ConfigError::ZeroLimit("per_window"));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::ZeroLimit("window_secs"));
        }
        if self.probe.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("connect_timeout_secs"));
        }
        if self.probe.session_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("session_timeout_secs"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind
            .parse()
            .map_err(|_| ConfigError::InvalidBind(self.server.bind.clone()))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            connect_timeout: Duration::from_secs(self.probe.connect_timeout_secs),
            session_timeout: Duration::from_secs(self.probe.session_timeout_secs),
            patterns: self.patterns.clone(),
        }
    }
}

/// Load configuration from files and the process environment.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(std::env::vars().collect())
}

/// Same layering as [`load_config`] with an explicit variable set.
pub fn load_config_from(vars: HashMap<String, String>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder()
        // 1. Embedded defaults (always available)
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        // 2. Local overrides (optional)
        .add_source(File::with_name("config/local").required(false))
        // 3. Namespaced environment variables
        // prefix_separator("_") lets XFERCHECK_PROBE__X work with a single _ after the prefix.
        .add_source(
            Environment::with_prefix("XFERCHECK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(Some(vars.clone())),
        );

    // 4. Legacy flat variables win over everything else
    let legacy = |var: &str| vars.get(var).map(|v| v.trim()).filter(|v| !v.is_empty());
    for (var, key) in LEGACY_OVERRIDES {
        if let Some(value) = legacy(var) {
            builder = builder.set_override(*key, value)?;
        }
    }
    if legacy("GOOGLE_SHEETS_SPREADSHEET_ID").is_some() && legacy("GOOGLE_SHEETS_ACCESS_TOKEN").is_some() {
        builder = builder.set_override("sheets.enabled", true)?;
    }

    let mut config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    config.patterns = Arc::new(PatternTable::new(
        &config.classifier.ftp_auth_pattern,
        &config.classifier.sftp_auth_pattern,
    )?);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_core::{Protocol, SessionFailureClass};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_load() {
        let config = load_config_from(HashMap::new()).unwrap();
        assert_eq!(config.rate_limit.per_window, 20);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.probe.connect_timeout_secs, 10);
        assert!(!config.sheets.is_usable());
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn namespaced_env_overrides_defaults() {
        let config = load_config_from(vars(&[
            ("XFERCHECK_PROBE__SESSION_TIMEOUT_SECS", "3"),
            ("XFERCHECK_LOGGING__JSON", "true"),
        ]))
        .unwrap();
        assert_eq!(config.probe.session_timeout_secs, 3);
        assert!(config.logging.json);
    }

    #[test]
    fn legacy_variables_are_honored() {
        let config = load_config_from(vars(&[
            ("RATE_LIMIT_PER_MINUTE", "5"),
            ("GOOGLE_SHEETS_SPREADSHEET_ID", "sheet-123"),
            ("GOOGLE_SHEETS_ACCESS_TOKEN", "ya29.token"),
            ("GOOGLE_SHEETS_METRICS_SHEET_NAME", "Metrics"),
        ]))
        .unwrap();
        assert_eq!(config.rate_limit.per_window, 5);
        assert_eq!(config.sheets.spreadsheet_id, "sheet-123");
        assert_eq!(config.sheets.metrics_sheet_name, "Metrics");
        assert!(config.sheets.is_usable());
    }

    #[test]
    fn zero_quota_is_rejected() {
        let err = load_config_from(vars(&[("RATE_LIMIT_PER_MINUTE", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroLimit("per_window")));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = load_config_from(vars(&[("XFERCHECK_CLASSIFIER__SFTP_AUTH_PATTERN", "(unclosed")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern(PatternError { vocabulary: "sftp_auth", .. })));
        assert!(err.to_string().starts_with("classifier.sftp_auth_pattern "));

        let err = load_config_from(vars(&[("XFERCHECK_CLASSIFIER__FTP_AUTH_PATTERN", "[")])).unwrap_err();
        assert!(err.to_string().starts_with("classifier.ftp_auth_pattern "));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let err = load_config_from(vars(&[("XFERCHECK_PROBE__CONNECT_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout("connect_timeout_secs")));
        let err = load_config_from(vars(&[("XFERCHECK_PROBE__SESSION_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroTimeout("session_timeout_secs")));
    }

    #[test]
    fn configured_patterns_reach_the_pipeline() {
        let config = load_config_from(vars(&[("XFERCHECK_CLASSIFIER__SFTP_AUTH_PATTERN", "banned")])).unwrap();
        let settings = config.pipeline_settings();
        assert_eq!(
            settings.patterns.classify(Protocol::SecureShell, "User BANNED"),
            SessionFailureClass::Credential
        );
        assert_eq!(
            settings.patterns.classify(Protocol::SecureShell, "Permission denied"),
            SessionFailureClass::Enumeration
        );
        assert_eq!(settings.session_timeout, Duration::from_secs(10));
    }

    #[test]
    fn debug_output_hides_the_access_token() {
        let config = load_config_from(vars(&[("GOOGLE_SHEETS_ACCESS_TOKEN", "ya29.secret")])).unwrap();
        assert!(!format!("{:?}", config.sheets).contains("ya29.secret"));
    }
}
