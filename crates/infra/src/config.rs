//! Worker configuration from environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `AGRITRAIN_INTERVAL_SECS` | `300` |
//! | `AGRITRAIN_MIN_IMAGES` | `10` |
//! | `AGRITRAIN_STALE_AFTER_SECS` | `0` (sweep disabled) |
//! | `AGRITRAIN_RETENTION` | `keep_all` |
//! | `AGRITRAIN_STORE` | `memory` |
//! | `DATABASE_URL` | required for `postgres` |
//! | `AGRITRAIN_BLOB_ROOT` | `./blobs` |
//!
//! Unparseable values are errors, never silently replaced by defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::maintenance::RetentionPolicy;
use crate::processor::ProcessorConfig;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}: invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key} is required when {because}")]
    Missing {
        key: &'static str,
        because: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "postgres" => Ok(StoreBackend::Postgres),
            _ => Err("expected `memory` or `postgres`".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    pub interval: Duration,
    pub processor: ProcessorConfig,
    /// `None` disables the staleness sweep.
    pub stale_after: Option<chrono::Duration>,
    pub retention: RetentionPolicy,
    pub store: StoreBackend,
    pub database_url: Option<String>,
    pub blob_root: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            processor: ProcessorConfig::default(),
            stale_after: None,
            retention: RetentionPolicy::KeepAll,
            store: StoreBackend::Memory,
            database_url: None,
            blob_root: PathBuf::from("./blobs"),
        }
    }
}

impl WorkerConfig {
    /// Build config from the process environment (call `load_dotenv()` first).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let interval_secs: u64 = parse_or(&get, "AGRITRAIN_INTERVAL_SECS", 300)?;
        if interval_secs == 0 {
            return Err(invalid("AGRITRAIN_INTERVAL_SECS", "0", "must be positive"));
        }

        let min_images = parse_or(&get, "AGRITRAIN_MIN_IMAGES", defaults.processor.min_images)?;

        let stale_secs: i64 = parse_or(&get, "AGRITRAIN_STALE_AFTER_SECS", 0)?;
        let stale_after = match stale_secs {
            0 => None,
            s if s < 0 => {
                return Err(invalid("AGRITRAIN_STALE_AFTER_SECS", &s.to_string(), "must not be negative"));
            }
            s => Some(chrono::Duration::try_seconds(s).ok_or_else(|| {
                invalid("AGRITRAIN_STALE_AFTER_SECS", &s.to_string(), "out of range")
            })?),
        };

        let retention = match get("AGRITRAIN_RETENTION") {
            Some(raw) => raw
                .parse::<RetentionPolicy>()
                .map_err(|e| invalid("AGRITRAIN_RETENTION", &raw, &e.to_string()))?,
            None => defaults.retention,
        };

        let store: StoreBackend = parse_or(&get, "AGRITRAIN_STORE", StoreBackend::Memory)?;
        let database_url = get("DATABASE_URL");
        if store == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing {
                key: "DATABASE_URL",
                because: "AGRITRAIN_STORE=postgres",
            });
        }

        let blob_root = get("AGRITRAIN_BLOB_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.blob_root);

        Ok(Self {
            interval: Duration::from_secs(interval_secs),
            processor: ProcessorConfig { min_images },
            stale_after,
            retention,
            store,
            database_url,
            blob_root,
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            min_images = self.processor.min_images,
            stale_after_secs = self.stale_after.map(|d| d.num_seconds()),
            retention = ?self.retention,
            store = ?self.store,
            database = %self.database_url.as_deref().map(redact_url).unwrap_or_else(|| "(none)".into()),
            blob_root = %self.blob_root.display(),
            "worker config loaded"
        );
    }
}

fn parse_or<T, F>(get: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Drop credentials from a connection URL.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, WorkerConfig::default());
        assert_eq!(cfg.interval, Duration::from_secs(300));
        assert_eq!(cfg.processor.min_images, 10);
        assert!(cfg.stale_after.is_none());
        assert_eq!(cfg.retention, RetentionPolicy::KeepAll);
    }

    #[test]
    fn reads_every_knob() {
        let cfg = config(&[
            ("AGRITRAIN_INTERVAL_SECS", "60"),
            ("AGRITRAIN_MIN_IMAGES", "25"),
            ("AGRITRAIN_STALE_AFTER_SECS", "3600"),
            ("AGRITRAIN_RETENTION", "keep_last:50"),
            ("AGRITRAIN_STORE", "postgres"),
            ("DATABASE_URL", "postgres://user:pw@db/agritrain"),
            ("AGRITRAIN_BLOB_ROOT", "/var/lib/agritrain"),
        ])
        .unwrap();

        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.processor.min_images, 25);
        assert_eq!(cfg.stale_after, Some(chrono::Duration::hours(1)));
        assert_eq!(cfg.retention, RetentionPolicy::KeepLast(50));
        assert_eq!(cfg.store, StoreBackend::Postgres);
        assert_eq!(cfg.blob_root, PathBuf::from("/var/lib/agritrain"));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            config(&[("AGRITRAIN_MIN_IMAGES", "ten")]),
            Err(ConfigError::Invalid {
                key: "AGRITRAIN_MIN_IMAGES",
                ..
            })
        ));
        assert!(config(&[("AGRITRAIN_INTERVAL_SECS", "0")]).is_err());
        assert!(config(&[("AGRITRAIN_STALE_AFTER_SECS", "-1")]).is_err());
        assert!(config(&[("AGRITRAIN_RETENTION", "forever")]).is_err());
        assert!(config(&[("AGRITRAIN_STORE", "redis")]).is_err());
    }

    #[test]
    fn postgres_requires_database_url() {
        assert_eq!(
            config(&[("AGRITRAIN_STORE", "postgres")]),
            Err(ConfigError::Missing {
                key: "DATABASE_URL",
                because: "AGRITRAIN_STORE=postgres",
            })
        );
    }

    #[test]
    fn empty_values_count_as_unset() {
        let cfg = config(&[("AGRITRAIN_INTERVAL_SECS", "  ")]).unwrap();
        assert_eq!(cfg.interval, Duration::from_secs(300));
    }

    #[test]
    fn redacts_credentials() {
        assert_eq!(redact_url("postgres://user:pw@db:5432/x"), "postgres://***@db:5432/x");
        assert_eq!(redact_url("postgres://db/x"), "postgres://db/x");
    }
}
