//! Tracing/logging initialization.
//!
//! Filtering comes from `RUST_LOG` (default `info`); the output format from
//! `LOG_FORMAT` (`json`, the default, or `pretty`).

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log format {0:?} (expected `json` or `pretty`)")]
pub struct UnknownLogFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    /// Unset or empty `LOG_FORMAT` means JSON.
    pub fn from_env() -> Result<Self, UnknownLogFormat> {
        match std::env::var("LOG_FORMAT") {
            Ok(v) if !v.trim().is_empty() => v.parse(),
            _ => Ok(Self::default()),
        }
    }
}

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            _ => Err(UnknownLogFormat(value.to_string())),
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(false)
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_names(true)
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert_eq!(" JSON ".parse::<LogFormat>(), Ok(LogFormat::Json));
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = "xml".parse::<LogFormat>().unwrap_err();
        assert_eq!(err, UnknownLogFormat("xml".to_string()));
        assert!(err.to_string().contains("\"xml\""));
    }

    #[test]
    fn init_is_idempotent() {
        init(LogFormat::Pretty);
        init(LogFormat::Json);
    }
}
