//! # ContainerActor: restart loop of one service.
//!
//! ## Event flow
//! ```text
//! loop {
//!   ├─► publish ServiceStarted(id)
//!   ├─► handle.run(token)             blocks until the container exits
//!   ├─► cancelled? ─► break            (stop: no ServiceExited)
//!   ├─► log exit code + runtime
//!   ├─► publish ServiceExited(id)
//!   └─► sleep(backoff)  ◄── cancellable
//! }
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** within one actor
//! - Cancellation is checked at **safe points**: before each start, after each
//!   exit, during publishes and during the backoff sleep
//! - The token gates each start inside `ContainerHandle::run`. Cancelling it
//!   does not kill a running container; `ContainerHandle::stop` does

use std::sync::Arc;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::container::ContainerHandle;
use crate::events::{Event, EventBus};
use crate::logging::Logger;
use crate::policies::BackoffPolicy;

/// Supervises one [`ContainerHandle`] until its token is cancelled.
pub(crate) struct ContainerActor {
    handle: Arc<ContainerHandle>,
    bus: EventBus,
    backoff: BackoffPolicy,
    log: Logger,
}

impl ContainerActor {
    pub(crate) fn new(
        handle: Arc<ContainerHandle>,
        bus: EventBus,
        backoff: BackoffPolicy,
        log: &Logger,
    ) -> Self {
        Self {
            log: log.container(handle.id()),
            handle,
            bus,
            backoff,
        }
    }

    /// Runs the restart loop.
    ///
    /// The attempt counter never resets; the backoff delay is derived from the
    /// number of exits so far.
    pub(crate) async fn run(self, token: CancellationToken) {
        let id = self.handle.shared_id();
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                break;
            }
            attempt = attempt.saturating_add(1);
            if !self.publish(Event::service_started(Arc::clone(&id)), &token).await {
                break;
            }
            tracing::info!(parent: self.log.span(), attempt, "starting container");

            let res = self.handle.run(&token).await;
            let runtime = self.handle.uptime().unwrap_or_default();
            if token.is_cancelled() {
                tracing::info!(parent: self.log.span(), runtime_ms = runtime.as_millis() as u64, "container stopped");
                break;
            }

            let delay = self.backoff.next(attempt - 1);
            match &res {
                Ok(code) => tracing::warn!(
                    parent: self.log.span(),
                    exit_code = code,
                    attempt,
                    runtime_ms = runtime.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "container exited, restarting"
                ),
                Err(e) => tracing::error!(
                    parent: self.log.span(),
                    error = %e,
                    label = e.as_label(),
                    attempt,
                    runtime_ms = runtime.as_millis() as u64,
                    delay_ms = delay.as_millis() as u64,
                    "container failed, restarting"
                ),
            }
            if !self.publish(Event::service_exited(Arc::clone(&id)), &token).await {
                break;
            }

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => { break; }
            }
        }
        tracing::debug!(parent: self.log.span(), "restart loop finished");
    }

    /// Pushes `ev` unless cancelled first; returns `false` on cancellation.
    async fn publish(&self, ev: Event, token: &CancellationToken) -> bool {
        select! {
            biased;
            _ = token.cancelled() => false,
            _ = self.bus.push(ev) => true,
        }
    }
}
