//! # Handle to one managed container.
//!
//! A [`ContainerHandle`] is created once per service and reused across
//! restarts; its run state resets at the start of every [`run`](ContainerHandle::run).
//!
//! ## Run cycle
//! ```text
//! run(cancel):
//!   ├─► cancel fired? ─► Cancelled       else register a fresh run_token
//!   ├─► mount::prepare(bundle, mode)      (only when mounting is enabled)
//!   ├─► OutputCapture::open()             stdout/stderr → log lines
//!   ├─► started_at = now
//!   ├─► runtime.run(id, bundle, io, run_token)   blocks until the container exits
//!   └─► release: drain capture, mount::cleanup
//!
//! stop():
//!   ├─► close capture (if still open)
//!   ├─► cancel run_token                  a start still in progress never runs
//!   └─► runtime.kill(id, SIGKILL)         run() then returns via release
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::io::OutputCapture;
use super::mount::{self, MountMode};
use super::runtime::ContainerRuntime;
use super::stats::ContainerStats;
use crate::error::ContainerError;
use crate::logging::Logger;

/// How long output is still forwarded after the container exited.
const OUTPUT_GRACE: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RunState {
    started_at: Option<Instant>,
    capture: Option<OutputCapture>,
    mounted: Option<MountMode>,
    run_token: Option<CancellationToken>,
}

/// One OCI container instance driven through a [`ContainerRuntime`].
pub struct ContainerHandle {
    id: Arc<str>,
    bundle: PathBuf,
    mount: Option<MountMode>,
    runtime: Arc<dyn ContainerRuntime>,
    log: Logger,
    state: Mutex<RunState>,
}

impl ContainerHandle {
    /// Creates a handle; `mount = None` leaves the bundle untouched.
    pub fn new(
        id: impl Into<Arc<str>>,
        bundle: impl Into<PathBuf>,
        mount: Option<MountMode>,
        runtime: Arc<dyn ContainerRuntime>,
        log: Logger,
    ) -> Self {
        let id = id.into();
        Self {
            log: log.container(&id),
            id,
            bundle: bundle.into(),
            mount,
            runtime,
            state: Mutex::new(RunState::default()),
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub(crate) fn shared_id(&self) -> Arc<str> {
        Arc::clone(&self.id)
    }

    #[inline]
    pub fn bundle(&self) -> &Path {
        &self.bundle
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the container and waits for it to exit.
    ///
    /// An already cancelled `cancel` prevents the start. It is checked under
    /// the lock [`stop`](Self::stop) takes, so a caller that cancels and then
    /// stops never leaves a container behind. Cancelling `cancel` later does
    /// not kill the container; `stop` does.
    ///
    /// Returns the exit code, or the error that prevented the start.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<i32, ContainerError> {
        let token = CancellationToken::new();
        {
            let mut state = self.state();
            if cancel.is_cancelled() {
                return Err(ContainerError::Cancelled { id: self.id.to_string() });
            }
            state.run_token = Some(token.clone());
        }

        if let Some(mode) = self.mount {
            tracing::info!(parent: self.log.span(), bundle = %self.bundle.display(), ?mode, "mounting container bundle");
            if let Err(e) = mount::prepare(&self.bundle, mode) {
                self.release().await;
                return Err(e);
            }
            self.state().mounted = Some(mode);
        }

        let (capture, io) = match OutputCapture::open(&self.log) {
            Ok(pair) => pair,
            Err(e) => {
                self.release().await;
                return Err(e);
            }
        };
        {
            let mut state = self.state();
            state.capture = Some(capture);
            state.started_at = Some(Instant::now());
        }

        let res = self.runtime.run(&self.id, &self.bundle, io, token).await;
        self.release().await;
        res
    }

    /// Forwards remaining output and undoes mounts; safe to call more than once.
    async fn release(&self) {
        let (capture, mounted) = {
            let mut state = self.state();
            state.run_token = None;
            (state.capture.take(), state.mounted.take())
        };
        if let Some(capture) = capture {
            capture.finish(OUTPUT_GRACE).await;
        }
        if let Some(mode) = mounted {
            tracing::info!(parent: self.log.span(), bundle = %self.bundle.display(), "unmounting container bundle");
            if let Err(e) = mount::cleanup(&self.bundle, mode) {
                tracing::warn!(parent: self.log.span(), error = %e, "bundle cleanup failed");
            }
        }
    }

    /// Closes output capture and force-kills the container's init process.
    ///
    /// A run still starting up is cancelled, so it never leaves a container
    /// behind; a kill that finds no container yet is then not an error.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        let (capture, run_token) = {
            let mut state = self.state();
            (state.capture.take(), state.run_token.clone())
        };
        if let Some(capture) = capture {
            capture.close();
        }
        let in_run = match run_token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        };

        match self.runtime.kill(&self.id, Signal::SIGKILL).await {
            Err(e) if in_run => {
                tracing::debug!(parent: self.log.span(), error = %e, "kill left to the cancelled run");
                Ok(())
            }
            res => res,
        }
    }

    /// Reads a statistics snapshot; fails if the container is not running.
    pub async fn stats(&self) -> Result<ContainerStats, ContainerError> {
        self.runtime.stats(&self.id).await
    }

    /// Liveness check; a failed state query counts as not running.
    pub async fn running(&self) -> bool {
        match self.runtime.state(&self.id).await {
            Ok(state) => state.is_running(),
            Err(e) => {
                tracing::error!(parent: self.log.span(), error = %e, "couldn't get container state");
                false
            }
        }
    }

    /// Time since the most recent run started; `None` if never started.
    pub fn uptime(&self) -> Option<Duration> {
        self.state().started_at.map(|t| t.elapsed())
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("id", &self.id)
            .field("bundle", &self.bundle)
            .field("mount", &self.mount)
            .finish_non_exhaustive()
    }
}
