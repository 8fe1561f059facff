//! # Metrics collector plugin.
//!
//! Publishes `RequestMetrics` on a fixed interval and records every
//! `ServiceMetrics` answer it sees, keeping the latest snapshot per service.
//!
//! ```text
//! ticker ──► push(RequestMetrics) ──► Bus ──► Supervisor
//!                                              │
//! latest[id] ◄── next(ServiceMetrics) ◄── Bus ◄┘ (one per service)
//! ```

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::plugin::Plugin;
use crate::config::Config;
use crate::container::ContainerStats;
use crate::error::PluginError;
use crate::events::{Event, EventBus, EventFilter, EventKind};
use crate::logging::Logger;

/// Periodic metrics requester and sink.
pub struct MetricsPlugin {
    interval: Mutex<Option<Duration>>,
    latest: Mutex<BTreeMap<String, ContainerStats>>,
    stop: CancellationToken,
    log: Logger,
}

impl MetricsPlugin {
    pub fn new(log: Logger) -> Self {
        Self {
            interval: Mutex::new(None),
            latest: Mutex::new(BTreeMap::new()),
            stop: CancellationToken::new(),
            log,
        }
    }

    /// Most recent snapshot received for `id`.
    pub fn latest(&self, id: &str) -> Option<ContainerStats> {
        self.latest_map().get(id).cloned()
    }

    fn latest_map(&self) -> MutexGuard<'_, BTreeMap<String, ContainerStats>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, ev: &Event) {
        match ev.stats() {
            Some(Ok(stats)) => {
                tracing::info!(
                    parent: self.log.span(),
                    container = ev.subject_id(),
                    cpu_total_ns = stats.cpu.usage.total,
                    memory_bytes = stats.memory.usage.usage,
                    pids = stats.pids.current,
                    "service metrics"
                );
                self.latest_map().insert(ev.subject_id().to_string(), stats);
            }
            Some(Err(e)) => {
                tracing::warn!(parent: self.log.span(), container = ev.subject_id(), error = %e, "undecodable metrics payload");
            }
            None => {}
        }
    }
}

#[async_trait]
impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn configure(&self, cfg: &Config) -> Result<(), PluginError> {
        *self.interval.lock().unwrap_or_else(PoisonError::into_inner) = Some(cfg.metrics.interval());
        Ok(())
    }

    async fn run(&self, bus: EventBus) -> Result<(), PluginError> {
        let every = self
            .interval
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or(PluginError::NotConfigured)?;
        let mut sub = bus.subscribe().await;

        // Requests go out from a separate task so a full bus never stalls our reads.
        let ticker_token = self.stop.child_token();
        let ticker = tokio::spawn({
            let bus = bus.clone();
            let token = ticker_token.clone();
            async move {
                let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticks.tick() => {
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = bus.push(Event::request_metrics()) => {}
                            }
                        }
                    }
                }
            }
        });

        let filter = EventFilter::Kind(EventKind::ServiceMetrics);
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                ev = sub.next_matching(&filter) => match ev {
                    Some(ev) => self.record(&ev),
                    None => {
                        self.stop.cancelled().await;
                        break;
                    }
                }
            }
        }

        ticker_token.cancel();
        let _ = ticker.await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), PluginError> {
        self.stop.cancel();
        Ok(())
    }
}
