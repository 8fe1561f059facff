//! Container execution: handles, runtime bindings and their data types.
//!
//! ## Contents
//! - [`ContainerHandle`] one managed container (run / stop / stats / running / uptime)
//! - [`ContainerRuntime`] runtime seam; [`RuncRuntime`] drives the `runc` binary
//! - [`OutputCapture`], [`ContainerIo`] stdout/stderr pipes forwarded to the log
//! - [`MountMode`] read-only bind or read-write overlay presentation of a bundle
//! - [`ContainerStats`], [`ContainerState`], [`ContainerStatus`] runtime reports

mod handle;
mod io;
pub mod mount;
mod runc;
mod runtime;
mod stats;

pub use handle::ContainerHandle;
pub use io::{ContainerIo, OutputCapture};
pub use mount::MountMode;
pub use runc::RuncRuntime;
pub use runtime::ContainerRuntime;
pub use stats::{
    ContainerState, ContainerStats, ContainerStatus, CpuStats, CpuUsage, MemoryEntry, MemoryStats,
    PidsStats,
};
