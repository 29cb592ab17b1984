//! Structured logging setup.
//!
//! brrtstack emits `tracing` events from the dispatch hot path (see the
//! logging codes in [`dispatcher`](crate::dispatcher)). Libraries embedding a
//! [`Router`](crate::router::Router) install their own subscriber; the binary
//! and tests call [`init_logging`].
//!
//! ## Environment Variables
//!
//! - `BRRTS_LOG_LEVEL`: trace/debug/info/warn/error (default `info`)
//! - `BRRTS_LOG_FORMAT`: `json` or `pretty` (default `json`)
//! - `BRRTS_LOG_TARGET_FILTER`: extra comma-separated `EnvFilter` directives
//! - `BRRTS_LOG_INCLUDE_LOCATION`: include file:line (default `false`)
//! - `BRRTS_LOG_ASYNC`: write through a non-blocking appender (default `true`)
//!
//! `RUST_LOG`, when set, takes precedence over `BRRTS_LOG_LEVEL`.

use anyhow::{Context, Result};
use std::env;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    /// Extra `EnvFilter` directives (comma-separated)
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
    /// Write through a `tracing-appender` worker thread
    pub async_logging: bool,
}

impl LogConfig {
    /// Parse configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("BRRTS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: LogFormat::parse(
                &env::var("BRRTS_LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            ),
            target_filter: env::var("BRRTS_LOG_TARGET_FILTER").ok(),
            include_location: env::var("BRRTS_LOG_INCLUDE_LOCATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
            async_logging: env::var("BRRTS_LOG_ASYNC")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(true),
        }
    }

    #[must_use]
    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            include_location: true,
            async_logging: false,
        }
    }

    #[must_use]
    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            include_location: false,
            async_logging: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// Build the filter: `RUST_LOG` or the configured level, plus the
    /// configured directives. Invalid directives are reported and skipped.
    ///
    /// # Errors
    ///
    /// Only if a built-in directive fails to parse.
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));

        // Client disconnects are logged by the HTTP server at debug/info.
        filter = filter.add_directive(
            "may_minihttp=warn"
                .parse()
                .context("parsing built-in log directive")?,
        );

        if let Some(target_filter) = &self.target_filter {
            for directive in target_filter.split(',').map(str::trim) {
                if directive.is_empty() {
                    continue;
                }
                match directive.parse() {
                    Ok(d) => filter = filter.add_directive(d),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        Ok(filter)
    }
}

/// Install the global subscriber.
///
/// With async logging the returned guard must be kept alive for the
/// lifetime of the program; dropping it flushes and stops the writer thread.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);

    let (writer, guard) = if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(non_blocking), Some(guard))
    } else {
        (tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout), None)
    };

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    };

    registry
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default_dev() {
        let config = LogConfig::default_dev();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.async_logging);
        assert!(config.include_location);
    }

    #[test]
    fn test_log_config_default_prod() {
        let config = LogConfig::default_prod();
        assert_eq!(config.level(), Level::INFO);
        assert_eq!(config.format, LogFormat::Json);
        assert!(config.async_logging);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("invalid"), LogFormat::Json);
    }

    #[test]
    fn test_unknown_level_defaults_to_info() {
        let mut config = LogConfig::default_dev();
        config.log_level = "chatty".to_string();
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_env_filter_skips_bad_directives() {
        let mut config = LogConfig::default_dev();
        config.target_filter = Some("brrtstack=trace, ,not a directive===".to_string());
        assert!(config.env_filter().is_ok());
    }
}
