//! # Supervisor: one restart loop per stored service.
//!
//! ```text
//! configure(cfg)
//!   └─► store.list_services() ─► ServiceTable { handle + token per id }
//!
//! run(bus)
//!   ├─► spawn ContainerActor per service (detached)
//!   └─► loop: next(RequestMetrics) ─► spawn publish ServiceMetrics per handle
//!
//! stop()
//!   ├─► cancel every restart token
//!   ├─► handle.stop() per service (best effort)
//!   └─► release run()
//! ```
//!
//! Lifecycle: `Idle ─► Configured ─► Running ─► Stopped`. `stop` is also
//! accepted from `Configured`; a later `run` then returns at once.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::actor::ContainerActor;
use super::table::ServiceTable;
use crate::config::Config;
use crate::container::{ContainerHandle, ContainerRuntime};
use crate::error::{PluginError, StoreError};
use crate::events::{Event, EventBus, EventFilter, EventKind};
use crate::logging::Logger;
use crate::plugins::{
    CliExposable, CommandSpec, MethodDesc, Plugin, RemoteCallable, RuntimeLookup,
    RuntimeProvider, control,
};
use crate::store::ServiceStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Configured,
    Running,
    Stopped,
}

/// Plugin that keeps every stored service running.
///
/// Each service gets a [`ContainerActor`] restarting it after every exit
/// with the configured backoff, indefinitely, until [`Plugin::stop`].
pub struct Supervisor {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn ServiceStore>,
    table: OnceLock<Arc<ServiceTable>>,
    lifecycle: Mutex<Lifecycle>,
    stop: CancellationToken,
    log: Logger,
}

impl Supervisor {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn ServiceStore>,
        log: Logger,
    ) -> Self {
        Self {
            runtime,
            store,
            table: OnceLock::new(),
            lifecycle: Mutex::new(Lifecycle::Idle),
            stop: CancellationToken::new(),
            log,
        }
    }

    /// Ids of the managed services; empty before configure.
    pub fn service_ids(&self) -> Vec<String> {
        self.table.get().map(|t| t.ids()).unwrap_or_default()
    }

    /// Ends the restart loop of `id` without killing its container.
    ///
    /// Returns `false` for unknown ids.
    pub fn cancel(&self, id: &str) -> bool {
        match self.table.get().and_then(|t| t.cancel_tokens.get(id)) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn table(&self) -> Result<Arc<ServiceTable>, PluginError> {
        self.table.get().cloned().ok_or(PluginError::NotConfigured)
    }

    fn answer_metrics(&self, table: &ServiceTable, bus: &EventBus) {
        for handle in table.handles.values() {
            tokio::spawn(publish_metrics(Arc::clone(handle), bus.clone(), self.log.clone()));
        }
    }
}

/// Publishes one `ServiceMetrics` for `handle`; failures are only logged.
async fn publish_metrics(handle: Arc<ContainerHandle>, bus: EventBus, log: Logger) {
    let stats = match handle.stats().await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::warn!(parent: log.span(), container = handle.id(), error = %e, label = e.as_label(), "metrics unavailable");
            return;
        }
    };
    match Event::service_metrics(handle.shared_id(), &stats) {
        Ok(ev) => bus.push(ev).await,
        Err(e) => {
            tracing::warn!(parent: log.span(), container = handle.id(), error = %e, "metrics not encodable");
        }
    }
}

#[async_trait]
impl Plugin for Supervisor {
    fn name(&self) -> &str {
        "supervisor"
    }

    async fn configure(&self, cfg: &Config) -> Result<(), PluginError> {
        if *self.lifecycle() != Lifecycle::Idle {
            return Err(PluginError::AlreadyConfigured);
        }

        let services = self.store.list_services().await?;
        let mut table = ServiceTable::new(cfg.supervisor.backoff_policy());
        for svc in services {
            let mount = cfg.runtime.mount.then_some(svc.mount);
            let handle = ContainerHandle::new(
                svc.id.as_str(),
                svc.bundle,
                mount,
                Arc::clone(&self.runtime),
                self.log.clone(),
            );
            if !table.insert(handle) {
                return Err(StoreError::DuplicateId(svc.id).into());
            }
        }
        let count = table.handles.len();

        let mut lifecycle = self.lifecycle();
        if *lifecycle != Lifecycle::Idle || self.table.set(Arc::new(table)).is_err() {
            return Err(PluginError::AlreadyConfigured);
        }
        *lifecycle = Lifecycle::Configured;
        tracing::info!(parent: self.log.span(), services = count, "supervisor configured");
        Ok(())
    }

    async fn run(&self, bus: EventBus) -> Result<(), PluginError> {
        {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Idle => return Err(PluginError::NotConfigured),
                Lifecycle::Running => return Err(PluginError::AlreadyRunning),
                Lifecycle::Stopped => {
                    tracing::debug!(parent: self.log.span(), "stopped before run");
                    return Ok(());
                }
                Lifecycle::Configured => *lifecycle = Lifecycle::Running,
            }
        }
        let table = self.table()?;

        // Subscribe before the first actor publishes anything.
        let mut sub = bus.subscribe().await;
        for (handle, token) in table.entries() {
            let actor = ContainerActor::new(Arc::clone(handle), bus.clone(), table.backoff, &self.log);
            tokio::spawn(actor.run(token.clone()));
        }
        tracing::info!(parent: self.log.span(), services = table.handles.len(), "supervisor running");

        let filter = EventFilter::Kind(EventKind::RequestMetrics);
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                ev = sub.next_matching(&filter) => match ev {
                    Some(_) => self.answer_metrics(&table, &bus),
                    None => {
                        self.stop.cancelled().await;
                        break;
                    }
                }
            }
        }
        bus.unsubscribe(&sub).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        {
            let mut lifecycle = self.lifecycle();
            match *lifecycle {
                Lifecycle::Idle => return Err(PluginError::NotConfigured),
                Lifecycle::Stopped => return Err(PluginError::AlreadyStopped),
                Lifecycle::Configured | Lifecycle::Running => *lifecycle = Lifecycle::Stopped,
            }
        }
        let table = self.table()?;

        for token in table.cancel_tokens.values() {
            token.cancel();
        }
        for handle in table.handles.values() {
            if let Err(e) = handle.stop().await {
                tracing::warn!(parent: self.log.span(), container = handle.id(), error = %e, label = e.as_label(), "stop failed");
            }
        }
        self.stop.cancel();
        tracing::info!(parent: self.log.span(), "supervisor stopped");
        Ok(())
    }

    fn as_remote(&self) -> Option<&dyn RemoteCallable> {
        Some(self)
    }

    fn as_cli(&self) -> Option<&dyn CliExposable> {
        Some(self)
    }

    fn as_runtime_provider(&self) -> Option<&dyn RuntimeProvider> {
        Some(self)
    }
}

impl RuntimeProvider for Supervisor {
    fn runtime_lookup(&self) -> Option<Arc<dyn RuntimeLookup>> {
        self.table
            .get()
            .map(|t| Arc::clone(t) as Arc<dyn RuntimeLookup>)
    }
}

#[async_trait]
impl RemoteCallable for Supervisor {
    fn methods(&self) -> Vec<MethodDesc> {
        control::methods()
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, PluginError> {
        let table = self.table()?;
        control::dispatch(table.as_ref(), method, args).await
    }
}

impl CliExposable for Supervisor {
    fn command(&self) -> CommandSpec {
        CommandSpec::new("supervisor", "Inspect and control supervised services")
            .subcommand(CommandSpec::new("status", "Show every service"))
            .subcommand(
                CommandSpec::new("restart", "Force-restart a service")
                    .arg("ID", "Service id"),
            )
    }
}
