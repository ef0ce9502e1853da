//! Structured logging setup.
//!
//! The library only emits `tracing` events; hosts that do not install their
//! own subscriber can call [`init_logging_with_config`]. Bearer tokens are
//! never recorded in events, only key IDs, subjects and reasons.

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
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Where formatted events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogWriter {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// trace/debug/info/warn/error
    pub log_level: String,
    pub format: LogFormat,
    pub writer: LogWriter,
    /// Write through a background thread
    pub async_logging: bool,
    /// Extra directives, comma separated (`routeguard::security=debug,reqwest=warn`)
    pub target_filter: Option<String>,
    /// Include file:line location (dev only)
    pub include_location: bool,
}

impl LogConfig {
    /// `ROUTEGUARD_LOG_*` environment variables with production defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default_prod();
        let flag = |var: &str, default: bool| {
            lookup(var)
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(default)
        };
        Self {
            log_level: lookup("ROUTEGUARD_LOG_LEVEL").unwrap_or(defaults.log_level),
            format: lookup("ROUTEGUARD_LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.format),
            writer: defaults.writer,
            async_logging: flag("ROUTEGUARD_LOG_ASYNC", defaults.async_logging),
            target_filter: lookup("ROUTEGUARD_LOG_TARGET_FILTER"),
            include_location: flag("ROUTEGUARD_LOG_INCLUDE_LOCATION", defaults.include_location),
        }
    }

    pub fn default_dev() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            writer: LogWriter::Stderr,
            async_logging: false,
            target_filter: None,
            include_location: true,
        }
    }

    pub fn default_prod() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            writer: LogWriter::Stdout,
            async_logging: true,
            target_filter: None,
            include_location: false,
        }
    }

    pub fn writer(mut self, writer: LogWriter) -> Self {
        self.writer = writer;
        self
    }
}

/// Keeps the background writer alive; dropping it flushes pending events.
#[derive(Debug)]
pub struct LoggingGuard {
    _worker: Option<WorkerGuard>,
}

fn parse_level(level: &str) -> Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// `RUST_LOG` wins over the configured level; target directives are added on top.
pub fn build_env_filter(config: &LogConfig) -> EnvFilter {
    let level = parse_level(&config.log_level);
    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if let Some(target_filter) = &config.target_filter {
        for filter in target_filter.split(',') {
            let filter = filter.trim();
            if filter.is_empty() {
                continue;
            }
            match filter.parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(_) => eprintln!("Warning: Invalid log filter directive: {filter}"),
            }
        }
    }
    env_filter
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_logging_with_config(config: &LogConfig) -> Result<LoggingGuard> {
    let (writer, worker) = match (config.async_logging, config.writer) {
        (true, LogWriter::Stdout) => {
            let (w, g) = tracing_appender::non_blocking(std::io::stdout());
            (tracing_subscriber::fmt::writer::BoxMakeWriter::new(w), Some(g))
        }
        (true, LogWriter::Stderr) => {
            let (w, g) = tracing_appender::non_blocking(std::io::stderr());
            (tracing_subscriber::fmt::writer::BoxMakeWriter::new(w), Some(g))
        }
        (false, LogWriter::Stdout) => (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stdout),
            None,
        ),
        (false, LogWriter::Stderr) => (
            tracing_subscriber::fmt::writer::BoxMakeWriter::new(std::io::stderr),
            None,
        ),
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

    tracing_subscriber::registry()
        .with(build_env_filter(config))
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(LoggingGuard { _worker: worker })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_from_lookup_defaults_to_prod() {
        let config = LogConfig::from_lookup(|_| None);
        assert_eq!(config, LogConfig::default_prod());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ROUTEGUARD_LOG_LEVEL", "debug"),
            ("ROUTEGUARD_LOG_FORMAT", "pretty"),
            ("ROUTEGUARD_LOG_ASYNC", "false"),
            ("ROUTEGUARD_LOG_INCLUDE_LOCATION", "true"),
            ("ROUTEGUARD_LOG_TARGET_FILTER", "reqwest=warn"),
        ]
        .into_iter()
        .collect();
        let config = LogConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(!config.async_logging);
        assert!(config.include_location);
        assert_eq!(config.target_filter.as_deref(), Some("reqwest=warn"));
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("TRACE"), Level::TRACE);
        assert_eq!(parse_level(" warn "), Level::WARN);
        assert_eq!(parse_level("verbose"), Level::INFO);
    }
}
