//! # `runc` runtime binding.
//!
//! Every operation shells out to the configured binary with a shared
//! `--root` state directory:
//!
//! | operation | command                                 |
//! |-----------|-----------------------------------------|
//! | run       | `delete --force ID`, then `run --bundle B ID` |
//!
//! A cancelled run is never started; once started it is killed with
//! `kill ID SIGKILL`, retried until `runc run` exits.
//! | kill      | `kill ID SIGNAL` (init process only)    |
//! | stats     | `events --stats ID`                     |
//! | state     | `state ID`                              |

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use super::io::ContainerIo;
use super::runtime::ContainerRuntime;
use super::stats::{ContainerState, ContainerStats};
use crate::config::RuntimeConfig;
use crate::error::ContainerError;
use crate::logging::Logger;

/// Pause between kills of a container that is still being created.
const KILL_RETRY: Duration = Duration::from_millis(50);

/// Runtime backed by the `runc` command line.
#[derive(Debug, Clone)]
pub struct RuncRuntime {
    binary: PathBuf,
    root: PathBuf,
    log: Logger,
}

#[derive(Deserialize)]
struct StatsEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: ContainerStats,
}

impl RuncRuntime {
    pub fn new(cfg: &RuntimeConfig, log: Logger) -> Self {
        Self {
            binary: cfg.binary.clone(),
            root: cfg.root.clone(),
            log,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--root").arg(&self.root).stdin(Stdio::null());
        cmd
    }

    /// Runs a short-lived runtime command and returns its stdout.
    async fn output(&self, op: &'static str, args: &[&str]) -> Result<Vec<u8>, ContainerError> {
        let out = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|source| ContainerError::Spawn { op, source })?;

        if !out.status.success() {
            return Err(ContainerError::Runtime {
                op,
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(out.stdout)
    }

    /// Kills `id` until its `runc run` process exits.
    ///
    /// `runc run` creates the container after it is spawned; a kill sent in
    /// between fails, so it is repeated until the container is gone.
    async fn kill_until_exit(&self, id: &str, child: &mut Child) -> Result<ExitStatus, ContainerError> {
        loop {
            if let Err(e) = self.kill(id, Signal::SIGKILL).await {
                tracing::debug!(parent: self.log.span(), container = id, error = %e, "kill not delivered yet");
            }
            tokio::select! {
                status = child.wait() => return Ok(status?),
                _ = tokio::time::sleep(KILL_RETRY) => {}
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for RuncRuntime {
    async fn run(
        &self,
        id: &str,
        bundle: &Path,
        io: ContainerIo,
        cancel: CancellationToken,
    ) -> Result<i32, ContainerError> {
        // A container left over from a crashed run blocks reuse of the id.
        let delete_args = ["delete", "--force", id];
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ContainerError::Cancelled { id: id.to_string() }),
            res = self.output("delete", &delete_args) => {
                if let Err(e) = res {
                    tracing::debug!(parent: self.log.span(), container = id, error = %e, "stale container delete failed");
                }
            }
        }

        let (stdout, stderr) = io.into_stdio();
        // The command owns the parent's copies of the write ends; drop it once
        // spawned so the readers see EOF when the container exits.
        let mut child = {
            let mut cmd = self.command();
            cmd.arg("run")
                .arg("--bundle")
                .arg(bundle)
                .arg(id)
                .stdout(stdout)
                .stderr(stderr);
            if cancel.is_cancelled() {
                return Err(ContainerError::Cancelled { id: id.to_string() });
            }
            cmd.spawn()
                .map_err(|source| ContainerError::Spawn { op: "run", source })?
        };

        let exited = tokio::select! {
            status = child.wait() => Some(status?),
            _ = cancel.cancelled() => None,
        };
        let status = match exited {
            Some(status) => status,
            None => self.kill_until_exit(id, &mut child).await?,
        };
        Ok(exit_code(status))
    }

    async fn kill(&self, id: &str, signal: Signal) -> Result<(), ContainerError> {
        self.output("kill", &["kill", id, signal.as_str()]).await?;
        Ok(())
    }

    async fn stats(&self, id: &str) -> Result<ContainerStats, ContainerError> {
        let raw = self.output("stats", &["events", "--stats", id]).await?;
        let ev: StatsEvent = serde_json::from_slice(&raw)
            .map_err(|source| ContainerError::Decode { op: "stats", source })?;
        if ev.kind != "stats" {
            return Err(ContainerError::Runtime {
                op: "stats",
                code: None,
                stderr: format!("unexpected event type `{}`", ev.kind),
            });
        }
        Ok(ev.data)
    }

    async fn state(&self, id: &str) -> Result<ContainerState, ContainerError> {
        let raw = self.output("state", &["state", id]).await?;
        serde_json::from_slice(&raw).map_err(|source| ContainerError::Decode { op: "state", source })
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;
    use crate::container::{ContainerStatus, OutputCapture};

    const FAKE_RUNC: &str = r#"#!/bin/sh
# args: --root ROOT OP ...
case "$3" in
  delete) exit 0 ;;
  run)
    echo "booting $6"
    echo "oops" >&2
    exit 3 ;;
  kill) [ "$5" = "SIGKILL" ] && exit 0; exit 1 ;;
  state)
    if [ "$4" = "web" ]; then
      echo '{"ociVersion":"1.0.2","id":"web","pid":42,"status":"running"}'
      exit 0
    fi
    echo "container does not exist" >&2
    exit 1 ;;
  events)
    echo '{"type":"stats","id":"web","data":{"memory":{"usage":{"usage":2048}},"pids":{"current":2}}}'
    exit 0 ;;
esac
exit 64
"#;

    // `run` only creates the container (pid file) after a delay, like real
    // runc; `kill` fails until then.
    const SLOW_RUNC: &str = r#"#!/bin/sh
echo "$3" >> "$2/ops"
case "$3" in
  delete) exit 0 ;;
  run)
    sleep 0.2
    echo $$ > "$2/pid"
    exec sleep 30 ;;
  kill)
    if [ -f "$2/pid" ]; then
      kill -9 "$(cat "$2/pid")"
      exit 0
    fi
    echo "container does not exist" >&2
    exit 1 ;;
esac
exit 64
"#;

    fn install(dir: &Path, body: &str) -> PathBuf {
        let script = dir.join("runc");
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn runtime_with(binary: PathBuf, root: &Path) -> RuncRuntime {
        let cfg = RuntimeConfig {
            binary,
            root: root.to_path_buf(),
            mount: false,
        };
        RuncRuntime::new(&cfg, Logger::detached())
    }

    #[tokio::test]
    async fn drives_runc_command_line() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime_with(install(dir.path(), FAKE_RUNC), dir.path());

        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();
        let code = rt
            .run("web", dir.path(), io, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(code, 3);
        capture.close();

        let state = rt.state("web").await.unwrap();
        assert_eq!(state.status, ContainerStatus::Running);
        assert_eq!(state.pid, 42);

        let err = rt.state("ghost").await.unwrap_err();
        assert_eq!(err.as_label(), "container_runtime");
        assert!(err.to_string().contains("does not exist"));

        let stats = rt.stats("web").await.unwrap();
        assert_eq!(stats.memory.usage.usage, 2048);
        assert_eq!(stats.pids.current, 2);

        rt.kill("web", Signal::SIGKILL).await.unwrap();
        assert!(rt.kill("web", Signal::SIGTERM).await.is_err());
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime_with(dir.path().join("no-such-runc"), dir.path());

        let err = rt.state("web").await.unwrap_err();
        assert_eq!(err.as_label(), "container_spawn");
    }

    #[tokio::test]
    async fn cancelled_run_never_starts_the_container() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime_with(install(dir.path(), SLOW_RUNC), dir.path());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();
        let err = rt.run("web", dir.path(), io, cancel).await.unwrap_err();
        capture.close();

        assert_eq!(err.as_label(), "container_cancelled");
        let ops = std::fs::read_to_string(dir.path().join("ops")).unwrap_or_default();
        assert!(!ops.lines().any(|op| op == "run"));
    }

    #[tokio::test]
    async fn cancel_during_creation_kills_once_the_container_exists() {
        let dir = tempfile::tempdir().unwrap();
        let rt = runtime_with(install(dir.path(), SLOW_RUNC), dir.path());

        let cancel = CancellationToken::new();
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();
        let run = tokio::spawn({
            let rt = rt.clone();
            let bundle = dir.path().to_path_buf();
            let cancel = cancel.clone();
            async move { rt.run("web", &bundle, io, cancel).await }
        });

        // `runc run` is spawned but the container does not exist yet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let code = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("run must return after cancel")
            .unwrap()
            .unwrap();
        assert_eq!(code, 137);
        capture.close();

        let ops = std::fs::read_to_string(dir.path().join("ops")).unwrap();
        assert!(ops.lines().filter(|op| *op == "kill").count() >= 1);
    }
}
