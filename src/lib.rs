//! # hostvisor
//!
//! **Hostvisor** is a host-local container supervisor, meant to run as the
//! init-like process of a machine image.
//!
//! It loads OCI bundles from a service directory, runs each one through an
//! OCI runtime (`runc`), restarts it after every exit with a backoff delay,
//! and lets loosely coupled plugins cooperate over a bounded event bus.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   services_dir/<id>/config.json      OS signals (SIGINT, SIGTERM, ...)
//!            │                                  │
//!            ▼                                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Registry (plugin owner)                                          │
//! │  - configure: fail-fast, then capability wiring                   │
//! │  - run: every plugin concurrently, first error stops all          │
//! │  - shutdown listener: RequestShutdown / terminal signal           │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌────────────┐    ┌────────────┐    ┌────────────┐
//!   │ Supervisor │    │  Metrics   │    │  Control   │
//!   │  plugin    │    │  plugin    │    │  plugin    │
//!   └─────┬──────┘    └─────┬──────┘    └─────┬──────┘
//!         │ one ContainerActor per service    │ RuntimeLookup
//!         ▼                 │                 │ (status, restart)
//!   ContainerHandle ◄───────┼─────────────────┘
//!     │  mount, capture output, runc run/kill/events/state
//!     ▼                     │
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 EventBus (bounded FIFO, fan-out)                  │
//! │  ServiceStarted · ServiceExited · ServiceMetrics                  │
//! │  RequestMetrics · RequestShutdown                                 │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Config ──► Registry::configure ──► Registry::run
//!
//! per service:
//! loop {
//!   ├─► publish ServiceStarted
//!   ├─► ContainerHandle::run()   (blocks until exit)
//!   ├─► publish ServiceExited
//!   └─► sleep(backoff)           (cancellable)
//! }
//!
//! shutdown: stop every plugin once ─► kill containers ─► stop bus
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                         |
//! |-------------------|----------------------------------------------------------|--------------------------------------------|
//! | **Events**        | Bounded, lossless, ordered fan-out of typed events.      | [`EventBus`], [`Event`], [`EventFilter`]   |
//! | **Plugins**       | Configure / run / stop contract plus capabilities.       | [`Plugin`], [`Registry`]                   |
//! | **Supervision**   | Restart every stored service after each exit.            | [`Supervisor`], [`BackoffPolicy`]          |
//! | **Containers**    | OCI runtime driving, output capture, bundle mounts.      | [`ContainerHandle`], [`ContainerRuntime`]  |
//! | **Storage**       | Service definitions read from a directory of bundles.    | [`ServiceStore`], [`FsStore`]              |
//! | **Errors**        | Typed errors with stable labels.                         | [`RegistryError`], [`PluginError`]         |
//! | **Configuration** | TOML file with per-section defaults.                     | [`Config`]                                 |
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hostvisor::{
//!     Config, FsStore, Logger, MetricsPlugin, Registry, RuncRuntime, Supervisor,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::from_file("/etc/hostvisor.toml")?;
//!     let log = Logger::new("hostvisor");
//!
//!     let runtime = Arc::new(RuncRuntime::new(&cfg.runtime, log.child("runc")));
//!     let store = Arc::new(FsStore::new(&cfg.store.services_dir));
//!
//!     let mut registry = Registry::new(log.child("registry"));
//!     registry.register(Arc::new(Supervisor::new(runtime, store, log.child("supervisor"))))?;
//!     registry.register(Arc::new(MetricsPlugin::new(log.child("metrics"))))?;
//!     registry.configure(&cfg).await?;
//!     registry.run().await?;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod container;
mod error;
pub mod events;
pub mod logging;
pub mod plugins;
mod policies;
pub mod signals;
pub mod store;
mod supervisor;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use config::Config;
pub use container::{ContainerHandle, ContainerRuntime, ContainerStats, MountMode, RuncRuntime};
pub use error::{ConfigError, ContainerError, PluginError, RegistryError, StoreError};
pub use events::{Event, EventBus, EventFilter, EventKind, Subscriber};
pub use logging::Logger;
pub use plugins::{ControlPlugin, MetricsPlugin, Plugin, Registry};
pub use policies::BackoffPolicy;
pub use signals::{Signal, SignalStream};
pub use store::{FsStore, ServiceSpec, ServiceStore};
pub use supervisor::Supervisor;
