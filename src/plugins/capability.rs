//! Optional plugin capabilities.
//!
//! The registry connects capabilities by type, never by plugin name: after
//! configuration every [`RuntimeConsumer`] is handed the lookup of the first
//! [`RuntimeProvider`]. [`RemoteCallable`] and [`CliExposable`] describe
//! surfaces a transport or CLI layer can mount.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::container::ContainerHandle;
use crate::error::PluginError;

/// Read access to the live container handles of a supervisor.
pub trait RuntimeLookup: Send + Sync {
    /// Ids of all managed services, sorted.
    fn ids(&self) -> Vec<String>;

    /// Handle of service `id`, if managed.
    fn handle(&self, id: &str) -> Option<Arc<ContainerHandle>>;
}

/// Plugin that offers a [`RuntimeLookup`].
pub trait RuntimeProvider: Send + Sync {
    /// Returns the lookup; `None` until configured.
    fn runtime_lookup(&self) -> Option<Arc<dyn RuntimeLookup>>;
}

/// Plugin that needs a [`RuntimeLookup`].
pub trait RuntimeConsumer: Send + Sync {
    fn attach_runtime(&self, lookup: Arc<dyn RuntimeLookup>);
}

/// One entry of a remote method table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MethodDesc {
    pub name: &'static str,
    pub summary: &'static str,
}

/// Plugin callable through a method table.
///
/// Arguments and results are JSON values; the wire format is left to the
/// transport.
#[async_trait]
pub trait RemoteCallable: Send + Sync {
    fn methods(&self) -> Vec<MethodDesc>;

    async fn call(
        &self,
        method: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, PluginError>;
}

/// Positional argument of a CLI command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    pub help: &'static str,
    pub required: bool,
}

/// Node of a CLI command tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub name: &'static str,
    pub about: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subcommands: Vec<CommandSpec>,
}

impl CommandSpec {
    pub fn new(name: &'static str, about: &'static str) -> Self {
        Self {
            name,
            about,
            args: Vec::new(),
            subcommands: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &'static str, help: &'static str) -> Self {
        self.args.push(ArgSpec {
            name,
            help,
            required: true,
        });
        self
    }

    pub fn subcommand(mut self, cmd: CommandSpec) -> Self {
        self.subcommands.push(cmd);
        self
    }
}

/// Plugin that contributes a command tree to a CLI front-end.
pub trait CliExposable: Send + Sync {
    fn command(&self) -> CommandSpec;
}
