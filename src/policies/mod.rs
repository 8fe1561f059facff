//! Restart policies.
//!
//! ## Contents
//! - [`BackoffPolicy`] how restart delays evolve (first / factor / max)
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { backoff_ms, backoff_factor, backoff_max_ms }
//!      └─► backoff_policy() ─► supervisor::actor::ContainerActor
//!           - backoff.next(attempt) to schedule the next start
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=1s, factor=1.0 (fixed), max=30s.

mod backoff;

pub use backoff::BackoffPolicy;
