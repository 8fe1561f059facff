//! # Event filters.
//!
//! [`EventFilter`] is a small predicate tree used by consumers that only care
//! about some events (see [`Subscriber::next_matching`](crate::Subscriber::next_matching)).
//!
//! ```rust
//! use hostvisor::{Event, EventFilter, EventKind};
//!
//! let exits_of_web = EventFilter::All(vec![
//!     EventFilter::Id("web".into()),
//!     EventFilter::Kind(EventKind::ServiceExited),
//! ]);
//!
//! assert!(exits_of_web.matches(&Event::service_exited("web")));
//! assert!(!exits_of_web.matches(&Event::service_started("web")));
//! assert!(!exits_of_web.matches(&Event::service_exited("db")));
//! ```

use super::event::{Event, EventKind};

/// Predicate over [`Event`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    /// Subject id equals the given id.
    Id(String),
    /// Kind equals the given kind.
    Kind(EventKind),
    /// Every inner filter matches (empty list matches everything).
    All(Vec<EventFilter>),
    /// At least one inner filter matches (empty list matches nothing).
    Any(Vec<EventFilter>),
}

impl EventFilter {
    /// Shorthand for `Any` over several kinds.
    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        EventFilter::Any(kinds.into_iter().map(EventFilter::Kind).collect())
    }

    pub fn matches(&self, ev: &Event) -> bool {
        match self {
            EventFilter::Id(id) => ev.subject_id() == id,
            EventFilter::Kind(kind) => ev.kind() == *kind,
            EventFilter::All(inner) => inner.iter().all(|f| f.matches(ev)),
            EventFilter::Any(inner) => inner.iter().any(|f| f.matches(ev)),
        }
    }
}
