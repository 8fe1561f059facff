//! # OS signal intake for the host process.
//!
//! [`SignalStream`] listens for the signals the host cares about and yields
//! them as [`Signal`] values, which the binary forwards to
//! [`Registry::handle`](crate::Registry::handle).
//!
//! ## Signals
//! **Terminal** (stop every plugin):
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal)
//! - `SIGQUIT`
//!
//! **Non-terminal** (logged, ignored):
//! - `SIGHUP`, `SIGUSR1`, `SIGUSR2`
//!
//! On non-unix platforms only Ctrl-C is observed.

use std::fmt;

/// A signal delivered to the host process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    Terminate,
    Quit,
    Hangup,
    User1,
    User2,
}

impl Signal {
    /// Returns `true` if this signal requests process termination.
    pub fn is_terminal(self) -> bool {
        matches!(self, Signal::Interrupt | Signal::Terminate | Signal::Quit)
    }

    /// Conventional short name (`SIGTERM`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
            Signal::Hangup => "SIGHUP",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stream of host signals.
///
/// Listeners are registered on construction and stay installed until the
/// stream is dropped.
#[cfg(unix)]
pub struct SignalStream {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
    user1: tokio::signal::unix::Signal,
    user2: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalStream {
    /// Registers listeners; fails if signal registration fails.
    pub fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
            hangup: signal(SignalKind::hangup())?,
            user1: signal(SignalKind::user_defined1())?,
            user2: signal(SignalKind::user_defined2())?,
        })
    }

    /// Waits for the next signal.
    ///
    /// Returns `None` once the runtime can no longer deliver signals.
    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            v = self.interrupt.recv() => v.map(|_| Signal::Interrupt),
            v = self.terminate.recv() => v.map(|_| Signal::Terminate),
            v = self.quit.recv()      => v.map(|_| Signal::Quit),
            v = self.hangup.recv()    => v.map(|_| Signal::Hangup),
            v = self.user1.recv()     => v.map(|_| Signal::User1),
            v = self.user2.recv()     => v.map(|_| Signal::User2),
        }
    }
}

/// Stream of host signals.
#[cfg(not(unix))]
pub struct SignalStream {
    _priv: (),
}

#[cfg(not(unix))]
impl SignalStream {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self { _priv: () })
    }

    pub async fn recv(&mut self) -> Option<Signal> {
        tokio::signal::ctrl_c().await.ok().map(|_| Signal::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(Signal::Interrupt.is_terminal());
        assert!(Signal::Terminate.is_terminal());
        assert!(Signal::Quit.is_terminal());
        assert!(!Signal::Hangup.is_terminal());
        assert!(!Signal::User1.is_terminal());
        assert!(!Signal::User2.is_terminal());
    }

    #[test]
    fn display_uses_conventional_name() {
        assert_eq!(Signal::Terminate.to_string(), "SIGTERM");
    }
}
