//! Bus events: types, filters and the broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`EventBuilder`] event classification and data
//! - [`EventFilter`] predicates over events
//! - [`EventBus`], [`Subscriber`] single-dispatcher publish/subscribe broker
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (started/exited/metrics), `MetricsPlugin`
//!   (metrics requests), any plugin (shutdown requests).
//! - **Consumers**: `Registry` (shutdown listener), `Supervisor` (metrics
//!   requests), `MetricsPlugin` (metrics), any other plugin.

mod bus;
mod event;
mod filter;

pub use bus::{EventBus, QUEUE_CAPACITY, Subscriber};
pub use event::{Event, EventBuilder, EventKind};
pub use filter::EventFilter;
