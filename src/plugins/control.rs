//! # Control facade over the supervised services.
//!
//! Exposes a small method table to remote callers:
//!
//! | method    | args           | result                                   |
//! |-----------|----------------|------------------------------------------|
//! | `status`  | none           | `[{id, running, uptime_secs, stats}]`    |
//! | `restart` | `{"id": ".."}` | `{id, restarted: true}`                  |
//!
//! `restart` force-stops the container; the supervisor's retry loop then
//! starts it again after its backoff. The table is served both by
//! [`ControlPlugin`] (through a wired [`RuntimeLookup`]) and by the
//! [`Supervisor`](crate::Supervisor) itself.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use super::capability::{MethodDesc, RemoteCallable, RuntimeConsumer, RuntimeLookup};
use super::plugin::Plugin;
use crate::config::Config;
use crate::container::ContainerStats;
use crate::error::PluginError;
use crate::events::EventBus;
use crate::logging::Logger;

/// Status line of one service.
#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub id: String,
    pub running: bool,
    pub uptime_secs: Option<u64>,
    pub stats: Option<ContainerStats>,
}

#[derive(Deserialize)]
struct RestartArgs {
    id: String,
}

pub(crate) fn methods() -> Vec<MethodDesc> {
    vec![
        MethodDesc {
            name: "status",
            summary: "Liveness, uptime and statistics of every service",
        },
        MethodDesc {
            name: "restart",
            summary: "Force-stop a service so it is started again",
        },
    ]
}

pub(crate) async fn dispatch(
    lookup: &dyn RuntimeLookup,
    method: &str,
    args: Value,
) -> Result<Value, PluginError> {
    match method {
        "status" => {
            let report = status(lookup).await;
            serde_json::to_value(report).map_err(|e| PluginError::Failed(e.to_string()))
        }
        "restart" => {
            let args: RestartArgs =
                serde_json::from_value(args).map_err(|e| PluginError::InvalidArgs(e.to_string()))?;
            restart(lookup, &args.id).await?;
            Ok(json!({ "id": args.id, "restarted": true }))
        }
        other => Err(PluginError::UnknownMethod(other.to_string())),
    }
}

/// Collects a status line per service, sorted by id.
pub async fn status(lookup: &dyn RuntimeLookup) -> Vec<ServiceStatus> {
    let mut report = Vec::new();
    for id in lookup.ids() {
        let Some(handle) = lookup.handle(&id) else {
            continue;
        };
        let running = handle.running().await;
        let stats = if running { handle.stats().await.ok() } else { None };
        report.push(ServiceStatus {
            uptime_secs: handle.uptime().map(|d| d.as_secs()),
            id,
            running,
            stats,
        });
    }
    report
}

/// Force-stops service `id`.
pub async fn restart(lookup: &dyn RuntimeLookup, id: &str) -> Result<(), PluginError> {
    let handle = lookup
        .handle(id)
        .ok_or_else(|| PluginError::UnknownService(id.to_string()))?;
    handle.stop().await?;
    Ok(())
}

/// Remote facade plugin.
///
/// Holds no transport of its own; a front-end calls it through
/// [`Registry::call`](crate::Registry::call).
pub struct ControlPlugin {
    lookup: RwLock<Option<Arc<dyn RuntimeLookup>>>,
    stop: CancellationToken,
    log: Logger,
}

impl ControlPlugin {
    pub fn new(log: Logger) -> Self {
        Self {
            lookup: RwLock::new(None),
            stop: CancellationToken::new(),
            log,
        }
    }

    fn lookup(&self) -> Option<Arc<dyn RuntimeLookup>> {
        self.lookup
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Plugin for ControlPlugin {
    fn name(&self) -> &str {
        "control"
    }

    async fn configure(&self, _cfg: &Config) -> Result<(), PluginError> {
        Ok(())
    }

    async fn run(&self, _bus: EventBus) -> Result<(), PluginError> {
        if self.lookup().is_none() {
            tracing::warn!(parent: self.log.span(), "no runtime lookup attached, calls will fail");
        }
        self.stop.cancelled().await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.stop.cancel();
        Ok(())
    }

    fn as_remote(&self) -> Option<&dyn RemoteCallable> {
        Some(self)
    }

    fn as_runtime_consumer(&self) -> Option<&dyn RuntimeConsumer> {
        Some(self)
    }
}

impl RuntimeConsumer for ControlPlugin {
    fn attach_runtime(&self, lookup: Arc<dyn RuntimeLookup>) {
        *self.lookup.write().unwrap_or_else(PoisonError::into_inner) = Some(lookup);
    }
}

#[async_trait]
impl RemoteCallable for ControlPlugin {
    fn methods(&self) -> Vec<MethodDesc> {
        methods()
    }

    async fn call(&self, method: &str, args: Value) -> Result<Value, PluginError> {
        let lookup = self.lookup().ok_or(PluginError::NotConfigured)?;
        tracing::debug!(parent: self.log.span(), method, "remote call");
        dispatch(lookup.as_ref(), method, args).await
    }
}
