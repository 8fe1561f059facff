//! Container supervision.
//!
//! - [`Supervisor`] the plugin: loads services, runs and stops them, answers
//!   metrics requests
//! - `ContainerActor` the per-service restart loop
//! - `ServiceTable` handles and restart tokens, shared as a
//!   [`RuntimeLookup`](crate::plugins::RuntimeLookup)

mod actor;
mod core;
mod table;

pub use self::core::Supervisor;
