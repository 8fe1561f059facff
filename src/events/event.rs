//! # Events exchanged over the [`EventBus`](crate::EventBus).
//!
//! The [`EventKind`] enum classifies events into two groups:
//! - **Requests**: asks addressed to whoever listens (shutdown, metrics)
//! - **Service events**: lifecycle and statistics of one managed container
//!
//! An [`Event`] is immutable once built. Deriving an event (for example tagging
//! it with a subject id) produces a copy, so copies already queued for other
//! subscribers never observe later changes.
//!
//! ## Ordering guarantees
//! Each event has a process-wide sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order in logs and tests.
//!
//! ## Example
//! ```rust
//! use hostvisor::{Event, EventKind};
//!
//! let ev = Event::builder(EventKind::ServiceExited)
//!     .with_subject("web")
//!     .build();
//!
//! assert_eq!(ev.kind(), EventKind::ServiceExited);
//! assert_eq!(ev.subject_id(), "web");
//! assert!(ev.payload().is_none());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::container::ContainerStats;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of bus events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // === Requests ===
    /// Any plugin asks the registry to stop the whole process.
    ///
    /// Sets: nothing (bus-wide).
    RequestShutdown,

    /// Asks the supervisor for one statistics snapshot per service.
    ///
    /// Sets: nothing (bus-wide).
    RequestMetrics,

    // === Service events ===
    /// A container is about to be started.
    ///
    /// Sets:
    /// - `subject_id`: service id
    ServiceStarted,

    /// A container exited (or failed to start) and will be restarted.
    ///
    /// Sets:
    /// - `subject_id`: service id
    ServiceExited,

    /// Point-in-time statistics of one container.
    ///
    /// Sets:
    /// - `subject_id`: service id
    /// - `payload`: JSON-encoded [`ContainerStats`]
    ServiceMetrics,
}

impl EventKind {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            EventKind::RequestShutdown => "request_shutdown",
            EventKind::RequestMetrics => "request_metrics",
            EventKind::ServiceStarted => "service_started",
            EventKind::ServiceExited => "service_exited",
            EventKind::ServiceMetrics => "service_metrics",
        }
    }
}

/// Immutable bus event.
///
/// Cheap to clone: the subject id and payload are reference-counted.
#[derive(Clone, Debug)]
pub struct Event {
    seq: u64,
    subject_id: Arc<str>,
    kind: EventKind,
    timestamp: i64,
    payload: Option<Arc<[u8]>>,
}

impl Event {
    /// Creates a bus-wide event of the given kind.
    pub fn new(kind: EventKind) -> Self {
        Self::builder(kind).build()
    }

    /// Starts building an event of the given kind.
    pub fn builder(kind: EventKind) -> EventBuilder {
        EventBuilder {
            kind,
            subject_id: Arc::from(""),
            payload: None,
        }
    }

    #[inline]
    pub fn request_shutdown() -> Self {
        Self::new(EventKind::RequestShutdown)
    }

    #[inline]
    pub fn request_metrics() -> Self {
        Self::new(EventKind::RequestMetrics)
    }

    #[inline]
    pub fn service_started(id: impl Into<Arc<str>>) -> Self {
        Self::builder(EventKind::ServiceStarted).with_subject(id).build()
    }

    #[inline]
    pub fn service_exited(id: impl Into<Arc<str>>) -> Self {
        Self::builder(EventKind::ServiceExited).with_subject(id).build()
    }

    /// Creates a `ServiceMetrics` event carrying the encoded snapshot.
    pub fn service_metrics(
        id: impl Into<Arc<str>>,
        stats: &ContainerStats,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::builder(EventKind::ServiceMetrics)
            .with_subject(id)
            .with_stats(stats)?
            .build())
    }

    /// Process-wide sequence number.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Service this event concerns; empty for bus-wide events.
    #[inline]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Construction time, unix seconds.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[inline]
    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }

    #[inline]
    pub fn is(&self, kind: EventKind) -> bool {
        self.kind == kind
    }

    /// Returns a copy of this event tagged with `id`.
    ///
    /// The copy keeps kind, timestamp and payload and gets a fresh `seq`.
    pub fn with_subject(&self, id: impl Into<Arc<str>>) -> Event {
        Event {
            seq: next_seq(),
            subject_id: id.into(),
            kind: self.kind,
            timestamp: self.timestamp,
            payload: self.payload.clone(),
        }
    }

    /// Decodes the statistics payload of a `ServiceMetrics` event.
    ///
    /// Returns `None` for events without payload.
    pub fn stats(&self) -> Option<Result<ContainerStats, serde_json::Error>> {
        self.payload.as_deref().map(serde_json::from_slice)
    }
}

/// Builder for [`Event`].
#[derive(Debug)]
#[must_use = "call `build()` to produce the event"]
pub struct EventBuilder {
    kind: EventKind,
    subject_id: Arc<str>,
    payload: Option<Arc<[u8]>>,
}

impl EventBuilder {
    #[inline]
    pub fn with_subject(mut self, id: impl Into<Arc<str>>) -> Self {
        self.subject_id = id.into();
        self
    }

    #[inline]
    pub fn with_payload(mut self, payload: impl Into<Arc<[u8]>>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Attaches `stats` as JSON payload.
    pub fn with_stats(self, stats: &ContainerStats) -> Result<Self, serde_json::Error> {
        let encoded = serde_json::to_vec(stats)?;
        Ok(self.with_payload(encoded))
    }

    /// Stamps sequence number and timestamp.
    pub fn build(self) -> Event {
        Event {
            seq: next_seq(),
            subject_id: self.subject_id,
            kind: self.kind,
            timestamp: unix_now(),
            payload: self.payload,
        }
    }
}

fn next_seq() -> u64 {
    EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::request_metrics();
        let b = Event::request_metrics();
        assert!(b.seq() > a.seq());
    }

    #[test]
    fn with_subject_copies_without_touching_original() {
        let original = Event::builder(EventKind::ServiceExited)
            .with_payload(vec![1, 2, 3])
            .build();
        let tagged = original.with_subject("db");

        assert_eq!(original.subject_id(), "");
        assert_eq!(tagged.subject_id(), "db");
        assert_eq!(tagged.kind(), EventKind::ServiceExited);
        assert_eq!(tagged.timestamp(), original.timestamp());
        assert_eq!(tagged.payload(), Some(&[1u8, 2, 3][..]));
        assert_ne!(tagged.seq(), original.seq());
    }

    #[test]
    fn metrics_payload_decodes_back() {
        let mut stats = ContainerStats::default();
        stats.memory.usage.usage = 4096;
        stats.pids.current = 3;

        let ev = Event::service_metrics("web", &stats).unwrap();
        assert!(ev.is(EventKind::ServiceMetrics));
        assert_eq!(ev.subject_id(), "web");

        let decoded = ev.stats().unwrap().unwrap();
        assert_eq!(decoded.memory.usage.usage, 4096);
        assert_eq!(decoded.pids.current, 3);
    }

    #[test]
    fn request_events_are_bus_wide() {
        let ev = Event::request_shutdown();
        assert_eq!(ev.subject_id(), "");
        assert!(ev.payload().is_none());
        assert!(ev.stats().is_none());
        assert!(ev.timestamp() > 0);
    }
}
