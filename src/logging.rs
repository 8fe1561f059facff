//! # Injected logging capability.
//!
//! Components never log through a global of their own. Each one receives a
//! [`Logger`] at construction and emits records with its span as explicit
//! parent (`tracing::info!(parent: log.span(), ...)`), so every record carries
//! the component context it was created under.
//!
//! The process-wide `tracing` subscriber is installed once at boot by [`init`].
//!
//! ```text
//! Logger::new("hostvisor")
//!   ├─► .child("registry")   ─► Registry
//!   ├─► .child("bus")        ─► EventBus
//!   └─► .child("supervisor") ─► Supervisor ─► ContainerHandle (one per service)
//! ```

use tracing::Span;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::ConfigError;

/// Handle to a logging context.
///
/// Cheap to clone. Records emitted with [`Logger::span`] as parent are tagged
/// with the component names of the whole chain.
#[derive(Clone, Debug)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// Creates a root logging context for the given component.
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("hostvisor", component = component),
        }
    }

    /// Creates a context with no parent span.
    ///
    /// Records are still emitted, just without component tags.
    pub fn detached() -> Self {
        Self { span: Span::none() }
    }

    /// Derives a nested context for a sub-component.
    pub fn child(&self, component: &'static str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "component", component = component),
        }
    }

    /// Derives a nested context for one managed container.
    pub fn container(&self, id: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "container", container = id),
        }
    }

    /// Returns the span used as parent for records.
    #[inline]
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::detached()
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `cfg.level`. Call once at boot; a second
/// call fails with [`ConfigError::Logging`].
pub fn init(cfg: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level).map_err(|e| ConfigError::Invalid {
            field: "logging.level",
            reason: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let res = if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    res.map_err(|e| ConfigError::Logging(e.to_string()))
}
