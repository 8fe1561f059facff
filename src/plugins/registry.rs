//! # Plugin registry: lifecycle owner of every hosted component.
//!
//! The [`Registry`] owns the [`EventBus`] and the registered plugins. It
//! configures them in registration order, wires capabilities, runs them
//! concurrently and coordinates shutdown.
//!
//! ## Architecture
//! ```text
//! register(plugin) ×N
//!        │
//! configure(cfg) ──► plugin.configure() in order (fail-fast)
//!        └─► wire(): RuntimeProvider ──lookup──► every RuntimeConsumer
//!
//! run():
//!   bus.start()
//!   shutdown listener: Bus ─► RequestShutdown ─► token.cancel()
//!   JoinSet: plugin_1.run(bus) … plugin_N.run(bus)   (panics caught)
//!   loop:
//!     ├─► plugin returned Err  → record first error, stop_all()
//!     ├─► token cancelled      → stop_all()
//!     └─► all joined           → bus.stop(), return first error
//!
//! handle(signal):
//!   terminal     → stop_all()
//!   non-terminal → ignored
//! ```
//!
//! ## Rules
//! - The stop sequence runs **at most once**: every plugin's `stop` is called
//!   exactly once, whichever trigger (signal, bus event, failure) comes first.
//! - `run` never returns before every plugin task has finished.
//! - The first plugin error is the final error.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::capability::{CommandSpec, MethodDesc, RuntimeLookup};
use super::plugin::Plugin;
use crate::config::Config;
use crate::error::{PluginError, RegistryError};
use crate::events::{EventBus, EventFilter, EventKind};
use crate::logging::Logger;
use crate::signals::Signal;

/// Owner of the event bus and of every plugin.
pub struct Registry {
    plugins: Vec<Arc<dyn Plugin>>,
    bus: EventBus,
    stopped: Mutex<bool>,
    log: Logger,
}

impl Registry {
    pub fn new(log: Logger) -> Self {
        Self {
            plugins: Vec::new(),
            bus: EventBus::new(log.child("bus")),
            stopped: Mutex::new(false),
            log,
        }
    }

    /// Adds a plugin; names must be unique.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), RegistryError> {
        let name = plugin.name();
        if self.plugins.iter().any(|p| p.name() == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        tracing::debug!(parent: self.log.span(), plugin = name, "plugin registered");
        self.plugins.push(plugin);
        Ok(())
    }

    /// Shared bus; plugins receive a clone in `run`.
    #[inline]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registered plugin names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Configures every plugin in registration order, then wires capabilities.
    ///
    /// Stops at the first failure.
    pub async fn configure(&self, cfg: &Config) -> Result<(), RegistryError> {
        for plugin in &self.plugins {
            let name = plugin.name();
            tracing::info!(parent: self.log.span(), plugin = name, "configuring plugin");
            plugin
                .configure(cfg)
                .await
                .map_err(|source| RegistryError::Configure {
                    name: name.to_string(),
                    source,
                })?;
        }
        self.wire();
        Ok(())
    }

    /// Hands the first runtime lookup to every consumer.
    fn wire(&self) {
        let providers: Vec<(&str, Arc<dyn RuntimeLookup>)> = self
            .plugins
            .iter()
            .filter_map(|p| {
                let lookup = p.as_runtime_provider()?.runtime_lookup()?;
                Some((p.name(), lookup))
            })
            .collect();
        if providers.len() > 1 {
            tracing::warn!(
                parent: self.log.span(),
                provider = providers[0].0,
                count = providers.len(),
                "several runtime providers registered, using the first"
            );
        }

        for plugin in &self.plugins {
            let Some(consumer) = plugin.as_runtime_consumer() else {
                continue;
            };
            match providers.first() {
                Some((provider, lookup)) => {
                    consumer.attach_runtime(Arc::clone(lookup));
                    tracing::debug!(parent: self.log.span(), consumer = plugin.name(), provider, "runtime lookup wired");
                }
                None => {
                    tracing::warn!(parent: self.log.span(), consumer = plugin.name(), "no runtime provider registered");
                }
            }
        }
    }

    /// Runs every plugin until all of them have returned.
    ///
    /// Returns the first plugin error, or the first stop error if no plugin
    /// failed. If the stop sequence already ran (a signal arrived before
    /// `run`), returns `Ok(())` without starting anything.
    pub async fn run(&self) -> Result<(), RegistryError> {
        if *self.stopped.lock().await {
            tracing::info!(parent: self.log.span(), "stop already requested, not starting plugins");
            return Ok(());
        }

        self.bus.start().await;
        let shutdown = CancellationToken::new();
        let listener = self.spawn_shutdown_listener(shutdown.clone()).await;

        let mut set = JoinSet::new();
        for plugin in &self.plugins {
            let plugin = Arc::clone(plugin);
            let bus = self.bus.clone();
            set.spawn(async move {
                let name = plugin.name().to_string();
                let res = std::panic::AssertUnwindSafe(plugin.run(bus))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(PluginError::Panicked(panic_message(panic))));
                (name, res)
            });
        }
        tracing::info!(parent: self.log.span(), plugins = self.plugins.len(), "plugins running");

        let mut first_err: Option<RegistryError> = None;
        let mut stop_err: Option<RegistryError> = None;
        let mut stop_requested = false;

        loop {
            tokio::select! {
                joined = set.join_next() => {
                    let Some(joined) = joined else { break };
                    let failure = match joined {
                        Ok((name, Ok(()))) => {
                            tracing::info!(parent: self.log.span(), plugin = %name, "plugin finished");
                            None
                        }
                        Ok((name, Err(source))) => Some(RegistryError::Plugin { name, source }),
                        Err(e) => Some(RegistryError::Plugin {
                            name: "unknown".to_string(),
                            source: PluginError::Panicked(e.to_string()),
                        }),
                    };
                    if let Some(err) = failure {
                        tracing::error!(parent: self.log.span(), error = %err, label = err.as_label(), "plugin failed");
                        first_err.get_or_insert(err);
                        if !stop_requested {
                            stop_requested = true;
                            if let Err(e) = self.stop_all().await {
                                stop_err.get_or_insert(e);
                            }
                        }
                    }
                }
                _ = shutdown.cancelled(), if !stop_requested => {
                    stop_requested = true;
                    tracing::info!(parent: self.log.span(), "shutdown requested on the bus");
                    if let Err(e) = self.stop_all().await {
                        stop_err.get_or_insert(e);
                    }
                }
            }
        }

        listener.abort();
        self.bus.stop().await;
        tracing::info!(parent: self.log.span(), "all plugins returned");

        match first_err.or(stop_err) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Reacts to a host signal: terminal signals stop every plugin.
    pub async fn handle(&self, signal: Signal) -> Result<(), RegistryError> {
        if !signal.is_terminal() {
            tracing::info!(parent: self.log.span(), %signal, "ignoring non-terminal signal");
            return Ok(());
        }
        tracing::info!(parent: self.log.span(), %signal, "terminal signal received");
        self.stop_all().await
    }

    /// Calls `stop` on every plugin, once per registry.
    ///
    /// Concurrent callers wait for the first sequence to finish; later calls
    /// are no-ops. Returns the first stop error.
    async fn stop_all(&self) -> Result<(), RegistryError> {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return Ok(());
        }
        *stopped = true;

        let mut first: Option<RegistryError> = None;
        for plugin in &self.plugins {
            let name = plugin.name();
            tracing::info!(parent: self.log.span(), plugin = name, "stopping plugin");
            if let Err(source) = plugin.stop().await {
                tracing::error!(parent: self.log.span(), plugin = name, error = %source, "plugin stop failed");
                first.get_or_insert(RegistryError::Stop {
                    name: name.to_string(),
                    source,
                });
            }
        }
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn spawn_shutdown_listener(
        &self,
        token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mut sub = self.bus.subscribe().await;
        tokio::spawn(async move {
            let filter = EventFilter::Kind(EventKind::RequestShutdown);
            if sub.next_matching(&filter).await.is_some() {
                token.cancel();
            }
        })
    }

    /// Method tables of every remotely callable plugin.
    pub fn remote_methods(&self) -> Vec<(&str, Vec<MethodDesc>)> {
        self.plugins
            .iter()
            .filter_map(|p| p.as_remote().map(|r| (p.name(), r.methods())))
            .collect()
    }

    /// Command trees of every CLI-exposable plugin.
    pub fn command_trees(&self) -> Vec<CommandSpec> {
        self.plugins
            .iter()
            .filter_map(|p| p.as_cli().map(|c| c.command()))
            .collect()
    }

    /// Invokes `method` on the remotely callable plugin `name`.
    pub async fn call(
        &self,
        name: &str,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, RegistryError> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| RegistryError::UnknownPlugin(name.to_string()))?;
        let remote = plugin
            .as_remote()
            .ok_or_else(|| RegistryError::NotRemote(name.to_string()))?;
        remote
            .call(method, args)
            .await
            .map_err(|source| RegistryError::Call {
                name: name.to_string(),
                method: method.to_string(),
                source,
            })
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
