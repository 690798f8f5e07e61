use crate::errors::types::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use when `RUST_LOG` does not say otherwise
    pub level: Level,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include file and line information
    pub file_info: bool,
    /// Log span enter/exit events
    pub log_spans: bool,
    /// Application name reported by [`log_welcome`]
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "vrs".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig {
            level,
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Build from the `[logging]` table of a configuration file
    pub fn from_settings(settings: &LoggingSettings, app_name: impl Into<String>) -> Result<Self> {
        Ok(LoggingConfig {
            level: parse_log_level(&settings.level)?,
            json: settings.json,
            file_info: settings.file_info,
            log_spans: settings.log_spans,
            app_name: app_name.into(),
        })
    }
}

/// Serialized form of [`LoggingConfig`]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
    pub log_spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

/// Install the global subscriber.
///
/// Fails with [`Error::Logging`] if a subscriber is already installed.
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.with_writer(std::io::stdout).json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}

/// Parse a log level such as `"debug"` or `"WARN"`
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim()).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_log_level("debug").ok(), Some(Level::DEBUG));
        assert_eq!(parse_log_level(" WARN ").ok(), Some(Level::WARN));
        assert!(matches!(parse_log_level("loud"), Err(Error::Config(_))));
    }

    #[test]
    fn settings_map_onto_config() {
        let settings = LoggingSettings {
            level: "trace".into(),
            json: true,
            ..Default::default()
        };
        let config = LoggingConfig::from_settings(&settings, "vrs-test").unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(config.json);
        assert!(!config.log_spans);
        assert_eq!(config.app_name, "vrs-test");
    }

    #[test]
    #[serial_test::serial]
    fn second_install_is_reported() {
        let config = LoggingConfig::default();
        let _ = setup_logging(&config);
        assert!(matches!(setup_logging(&config), Err(Error::Logging(_))));
    }
}
