//! Plugin contract, capabilities, the registry and the bundled plugins.
//!
//! ## Contents
//! - [`Plugin`] configure / run / stop contract
//! - [`RemoteCallable`], [`CliExposable`], [`RuntimeProvider`], [`RuntimeConsumer`],
//!   [`RuntimeLookup`] optional capabilities
//! - [`Registry`] owner of the bus and of every plugin
//! - [`MetricsPlugin`] periodic metrics requests and sink
//! - [`ControlPlugin`] remote facade (`status`, `restart`)

mod capability;
pub mod control;
mod metrics;
mod plugin;
mod registry;

pub use capability::{
    ArgSpec, CliExposable, CommandSpec, MethodDesc, RemoteCallable, RuntimeConsumer,
    RuntimeLookup, RuntimeProvider,
};
pub use control::{ControlPlugin, ServiceStatus};
pub use metrics::MetricsPlugin;
pub use plugin::Plugin;
pub use registry::Registry;
