//! Test doubles for the container runtime and the service store, plus a
//! thread-local log recorder.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;

use crate::container::{
    ContainerIo, ContainerRuntime, ContainerState, ContainerStats, ContainerStatus, MountMode,
};
use crate::error::{ContainerError, StoreError};
use crate::store::{ServiceSpec, ServiceStore};

/// What a scripted container does when run.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Script {
    /// Exits immediately with the code.
    Exit(i32),
    /// Runs until killed, then reports 137.
    Block,
    /// Becomes live only after the delay, then behaves like `Block`.
    SlowStart(Duration),
    /// Fails to start.
    Fail(&'static str),
}

/// In-memory runtime following a per-id script.
#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    scripts: HashMap<String, Script>,
    live: Mutex<HashMap<String, CancellationToken>>,
    runs: Mutex<HashMap<String, u32>>,
    kills: Mutex<HashMap<String, u32>>,
}

impl ScriptedRuntime {
    /// Live until killed or cancelled; a cancel stands for the runtime's own kill.
    async fn block(&self, id: &str, cancel: &CancellationToken) -> Result<i32, ContainerError> {
        let token = CancellationToken::new();
        self.live
            .lock()
            .unwrap()
            .insert(id.to_string(), token.clone());
        tokio::select! {
            _ = token.cancelled() => {}
            _ = cancel.cancelled() => {}
        }
        self.live.lock().unwrap().remove(id);
        Ok(137)
    }

    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the behavior of `id`; unscripted ids exit with 0.
    pub(crate) fn script(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub(crate) fn runs(&self, id: &str) -> u32 {
        self.runs.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn kills(&self, id: &str) -> u32 {
        self.kills.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub(crate) fn live(&self, id: &str) -> bool {
        self.live.lock().unwrap().contains_key(id)
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn run(
        &self,
        id: &str,
        _bundle: &Path,
        io: ContainerIo,
        cancel: CancellationToken,
    ) -> Result<i32, ContainerError> {
        // Closing the write ends lets the capture readers finish.
        drop(io);
        if cancel.is_cancelled() {
            return Err(ContainerError::Cancelled { id: id.to_string() });
        }
        *self.runs.lock().unwrap().entry(id.to_string()).or_default() += 1;

        match self.scripts.get(id).copied().unwrap_or(Script::Exit(0)) {
            Script::Exit(code) => {
                tokio::task::yield_now().await;
                Ok(code)
            }
            Script::Fail(msg) => Err(ContainerError::Runtime {
                op: "run",
                code: None,
                stderr: msg.to_string(),
            }),
            Script::Block => self.block(id, &cancel).await,
            Script::SlowStart(delay) => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(ContainerError::Cancelled { id: id.to_string() }),
                    _ = tokio::time::sleep(delay) => self.block(id, &cancel).await,
                }
            }
        }
    }

    async fn kill(&self, id: &str, _signal: Signal) -> Result<(), ContainerError> {
        *self.kills.lock().unwrap().entry(id.to_string()).or_default() += 1;
        match self.live.lock().unwrap().get(id) {
            Some(token) => {
                token.cancel();
                Ok(())
            }
            None => Err(ContainerError::NotRunning { id: id.to_string() }),
        }
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, ContainerError> {
        if !self.live(id) {
            return Err(ContainerError::NotRunning { id: id.to_string() });
        }
        let mut stats = ContainerStats::default();
        stats.pids.current = 1;
        stats.memory.usage.usage = 1 << 20;
        Ok(stats)
    }

    async fn state(&self, id: &str) -> Result<ContainerState, ContainerError> {
        let status = if self.live(id) {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        };
        Ok(ContainerState {
            id: id.to_string(),
            pid: 0,
            status,
        })
    }
}

/// Store returning a fixed list of services.
pub(crate) struct StaticStore {
    services: Vec<ServiceSpec>,
}

impl StaticStore {
    pub(crate) fn with_ids(ids: &[&str]) -> Self {
        let services = ids
            .iter()
            .map(|id| ServiceSpec {
                id: id.to_string(),
                bundle: PathBuf::from("/bundles").join(id),
                mount: MountMode::ReadOnly,
                spec: serde_json::json!({ "ociVersion": "1.0.2" }),
            })
            .collect();
        Self { services }
    }
}

#[async_trait]
impl ServiceStore for StaticStore {
    async fn list_services(&self) -> Result<Vec<ServiceSpec>, StoreError> {
        Ok(self.services.clone())
    }
}

/// Records every log line emitted on the current thread while alive.
///
/// Works with current-thread runtimes, where spawned tasks share the thread.
pub(crate) struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

struct LogWriter(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    pub(crate) fn install() -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let writer = {
            let buf = Arc::clone(&buf);
            move || LogWriter(Arc::clone(&buf))
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer)
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        Self {
            buf,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub(crate) fn contains(&self, needle: &str) -> bool {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).contains(needle)
    }
}
