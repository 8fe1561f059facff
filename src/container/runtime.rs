//! # Container runtime binding.
//!
//! [`ContainerRuntime`] is the seam between a [`ContainerHandle`](super::ContainerHandle)
//! and whatever actually executes OCI bundles. [`RuncRuntime`](super::RuncRuntime)
//! drives the `runc` binary; tests use a scripted in-memory implementation.

use std::path::Path;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;

use super::io::ContainerIo;
use super::stats::{ContainerState, ContainerStats};
use crate::error::ContainerError;

/// OCI-compatible runtime operations used by the supervisor.
///
/// Implementations must be cheap to share (`Arc<dyn ContainerRuntime>`) and
/// safe to call concurrently for different ids.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    /// Runs container `id` from `bundle` and waits for it to exit.
    ///
    /// The container's stdout/stderr are attached to `io`. Returns the exit
    /// code; a container killed by a signal reports `128 + signo`.
    ///
    /// Once `cancel` fires the container must not outlive the call: a start
    /// that has not happened yet is abandoned with
    /// [`ContainerError::Cancelled`], a started container is killed and
    /// waited for.
    async fn run(
        &self,
        id: &str,
        bundle: &Path,
        io: ContainerIo,
        cancel: CancellationToken,
    ) -> Result<i32, ContainerError>;

    /// Sends `signal` to the container's init process.
    async fn kill(&self, id: &str, signal: Signal) -> Result<(), ContainerError>;

    /// Reads a statistics snapshot; fails if the container is not running.
    async fn stats(&self, id: &str) -> Result<ContainerStats, ContainerError>;

    /// Probes the container's current state.
    async fn state(&self, id: &str) -> Result<ContainerState, ContainerError>;
}
