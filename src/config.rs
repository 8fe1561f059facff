//! # Host configuration.
//!
//! Provides [`Config`], settings shared by the registry and every plugin.
//! Each plugin reads the section it cares about during `configure`.
//!
//! ## File format
//! ```toml
//! [store]
//! services_dir = "/containers/services"
//!
//! [runtime]
//! binary = "runc"
//! root = "/run/runc"
//! mount = false
//!
//! [supervisor]
//! backoff_ms = 1000
//! backoff_factor = 1.0
//! backoff_max_ms = 30000
//!
//! [metrics]
//! interval_ms = 2000
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Every section and field is optional; missing values fall back to [`Default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where service bundles are found.
    pub store: StoreConfig,
    /// How containers are executed.
    pub runtime: RuntimeConfig,
    /// Restart behavior of the supervisor.
    pub supervisor: SupervisorConfig,
    /// Metrics collection cadence.
    pub metrics: MetricsConfig,
    /// Log level and format.
    pub logging: LoggingConfig,
}

/// Service store settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory whose sub-directories are OCI bundles, one per service.
    pub services_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            services_dir: PathBuf::from("/containers/services"),
        }
    }
}

/// Container runtime settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Path or name of the runc-compatible binary.
    pub binary: PathBuf,
    /// State directory passed as `--root`.
    pub root: PathBuf,
    /// Prepare bundle mounts (bind RO / overlay RW) before each run.
    pub mount: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("runc"),
            root: PathBuf::from("/run/runc"),
            mount: false,
        }
    }
}

/// Supervisor restart settings.
///
/// Restarts happen at a fixed interval unless `backoff_factor` is raised
/// above `1.0`. Growth is opt-in; defaults never change the interval.
///
/// ## Field semantics
/// - `backoff_ms`: restart interval, or the first delay when growing (must be `> 0`)
/// - `backoff_factor`: `1.0` keeps the interval fixed; `> 1.0` multiplies
///   the delay after every exit (must be finite and `>= 1.0`)
/// - `backoff_max_ms`: cap for a growing delay; ignored at `1.0`
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorConfig {
    pub backoff_ms: u64,
    pub backoff_factor: f64,
    pub backoff_max_ms: u64,
}

impl SupervisorConfig {
    /// Builds the restart backoff policy from these settings.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.backoff_ms),
            max: Duration::from_millis(self.backoff_max_ms.max(self.backoff_ms)),
            factor: self.backoff_factor,
        }
    }
}

impl Default for SupervisorConfig {
    /// Fixed one second between restarts.
    fn default() -> Self {
        Self {
            backoff_ms: 1000,
            backoff_factor: 1.0,
            backoff_max_ms: 30_000,
        }
    }
}

/// Metrics plugin settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// How often `RequestMetrics` is published.
    pub interval_ms: u64,
}

impl MetricsConfig {
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

/// Logging settings, consumed by [`logging::init`](crate::logging::init).
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON records instead of human-readable lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Reads, parses and validates a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.services_dir.as_os_str().is_empty() {
            return Err(invalid("store.services_dir", "must not be empty"));
        }
        if self.runtime.binary.as_os_str().is_empty() {
            return Err(invalid("runtime.binary", "must not be empty"));
        }
        if self.runtime.root.as_os_str().is_empty() {
            return Err(invalid("runtime.root", "must not be empty"));
        }
        if self.supervisor.backoff_ms == 0 {
            return Err(invalid("supervisor.backoff_ms", "must be greater than zero"));
        }
        if !self.supervisor.backoff_factor.is_finite() || self.supervisor.backoff_factor < 1.0 {
            return Err(invalid("supervisor.backoff_factor", "must be a finite value >= 1.0"));
        }
        if self.metrics.interval_ms == 0 {
            return Err(invalid("metrics.interval_ms", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let cfg = Config::from_toml_str("").unwrap();
        assert_eq!(cfg.store.services_dir, PathBuf::from("/containers/services"));
        assert_eq!(cfg.runtime.binary, PathBuf::from("runc"));
        assert!(!cfg.runtime.mount);
        assert_eq!(cfg.supervisor.backoff_policy().next(0), Duration::from_secs(1));
        assert_eq!(cfg.metrics.interval(), Duration::from_secs(2));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = Config::from_toml_str(
            r#"
            [store]
            services_dir = "/srv/bundles"

            [runtime]
            root = "/tmp/runc"
            mount = true

            [supervisor]
            backoff_ms = 250

            [metrics]
            interval_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(cfg.store.services_dir, PathBuf::from("/srv/bundles"));
        assert_eq!(cfg.runtime.root, PathBuf::from("/tmp/runc"));
        assert!(cfg.runtime.mount);
        assert_eq!(cfg.supervisor.backoff_policy().next(3), Duration::from_millis(250));
        assert_eq!(cfg.metrics.interval(), Duration::from_millis(500));
    }

    #[test]
    fn restart_interval_is_fixed_unless_growth_is_requested() {
        let fixed = Config::default().supervisor.backoff_policy();
        assert_eq!(fixed.next(0), fixed.next(50));

        let cfg = Config::from_toml_str(
            "[supervisor]\nbackoff_ms = 100\nbackoff_factor = 2.0\nbackoff_max_ms = 300\n",
        )
        .unwrap();
        let growing = cfg.supervisor.backoff_policy();
        assert_eq!(growing.next(0), Duration::from_millis(100));
        assert_eq!(growing.next(1), Duration::from_millis(200));
        assert_eq!(growing.next(2), Duration::from_millis(300));

        for factor in ["0.5", "nan"] {
            let raw = format!("[supervisor]\nbackoff_factor = {factor}\n");
            let err = Config::from_toml_str(&raw).unwrap_err();
            assert_eq!(err.as_label(), "config_invalid");
        }
    }

    #[test]
    fn zero_backoff_is_rejected() {
        let err = Config::from_toml_str("[supervisor]\nbackoff_ms = 0\n").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = Config::from_toml_str("[runtime]\nbinray = \"runc\"\n").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn missing_file_reports_path() {
        let err = Config::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
