//! # Plugin contract.
//!
//! Every component hosted by the [`Registry`](crate::Registry) implements
//! [`Plugin`]. The lifecycle is:
//!
//! ```text
//! configure(&Config) ─► run(EventBus) ········ blocks ········► Ok / Err
//!                            ▲
//!                 stop() ────┘  (from the registry: signal, shutdown event
//!                                 or another plugin's failure)
//! ```
//!
//! Optional capabilities are discovered through the `as_*` accessors, which
//! return `None` unless the plugin overrides them.

use async_trait::async_trait;

use super::capability::{CliExposable, RemoteCallable, RuntimeConsumer, RuntimeProvider};
use crate::config::Config;
use crate::error::PluginError;
use crate::events::EventBus;

/// A component hosted by the registry.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use hostvisor::{Config, EventBus, Plugin, PluginError};
///
/// struct Heartbeat {
///     stop: CancellationToken,
/// }
///
/// #[async_trait]
/// impl Plugin for Heartbeat {
///     fn name(&self) -> &str {
///         "heartbeat"
///     }
///
///     async fn configure(&self, _cfg: &Config) -> Result<(), PluginError> {
///         Ok(())
///     }
///
///     async fn run(&self, _bus: EventBus) -> Result<(), PluginError> {
///         self.stop.cancelled().await;
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), PluginError> {
///         self.stop.cancel();
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Stable, unique name; used as the registry key.
    fn name(&self) -> &str;

    /// Reads configuration and prepares internal state.
    async fn configure(&self, cfg: &Config) -> Result<(), PluginError>;

    /// Runs until stopped. An error here is fatal to the whole process.
    async fn run(&self, bus: EventBus) -> Result<(), PluginError>;

    /// Makes a pending or future [`run`](Plugin::run) return.
    async fn stop(&self) -> Result<(), PluginError>;

    /// Method table for remote invocation.
    fn as_remote(&self) -> Option<&dyn RemoteCallable> {
        None
    }

    /// Command tree for a CLI front-end.
    fn as_cli(&self) -> Option<&dyn CliExposable> {
        None
    }

    /// Lookup of live container handles offered to other plugins.
    fn as_runtime_provider(&self) -> Option<&dyn RuntimeProvider> {
        None
    }

    /// Receiver of a container handle lookup.
    fn as_runtime_consumer(&self) -> Option<&dyn RuntimeConsumer> {
        None
    }
}
