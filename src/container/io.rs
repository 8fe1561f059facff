//! # Container output capture.
//!
//! [`OutputCapture::open`] creates one pipe per stream. The write ends go to
//! the runtime as [`ContainerIo`]; the read ends are drained by background
//! tasks that forward every line to the log, tagged with the stream name.
//!
//! ```text
//! container stdout ─► pipe ─► reader task ─► info!(stream = "stdout", ...)
//! container stderr ─► pipe ─► reader task ─► info!(stream = "stderr", ...)
//! ```

use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::Duration;

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::error::ContainerError;
use crate::logging::Logger;

/// Write ends handed to the runtime for one run.
#[derive(Debug)]
pub struct ContainerIo {
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

impl ContainerIo {
    /// Converts into stdio handles for a child process.
    pub fn into_stdio(self) -> (Stdio, Stdio) {
        (Stdio::from(self.stdout), Stdio::from(self.stderr))
    }
}

/// Read side of a run's output pipes.
///
/// Released exactly once: [`finish`](Self::finish) on run-exit or
/// [`close`](Self::close) on stop, whichever comes first.
#[derive(Debug)]
pub struct OutputCapture {
    readers: Vec<JoinHandle<()>>,
}

impl OutputCapture {
    /// Creates the pipes and starts the line readers.
    pub fn open(log: &Logger) -> Result<(Self, ContainerIo), ContainerError> {
        let (stdout_r, stdout_w) = pipe2(OFlag::O_CLOEXEC).map_err(std::io::Error::from)?;
        let (stderr_r, stderr_w) = pipe2(OFlag::O_CLOEXEC).map_err(std::io::Error::from)?;

        let readers = vec![
            spawn_reader("stdout", stdout_r, log.clone()),
            spawn_reader("stderr", stderr_r, log.clone()),
        ];
        let io = ContainerIo {
            stdout: stdout_w,
            stderr: stderr_w,
        };
        Ok((Self { readers }, io))
    }

    /// Forwards what is left in the pipes, then releases the read ends.
    ///
    /// Meant for after the container exited. A pipe still held open by a
    /// stray process is abandoned after `grace`.
    pub async fn finish(self, grace: Duration) {
        let mut readers = self.readers;
        let drained = tokio::time::timeout(grace, async {
            for reader in readers.iter_mut() {
                let _ = reader.await;
            }
        })
        .await;
        if drained.is_err() {
            for reader in &readers {
                reader.abort();
            }
        }
    }

    /// Stops forwarding at once and releases the read ends.
    pub fn close(self) {
        for reader in self.readers {
            reader.abort();
        }
    }
}

fn spawn_reader(stream: &'static str, fd: OwnedFd, log: Logger) -> JoinHandle<()> {
    let file = tokio::fs::File::from_std(std::fs::File::from(fd));
    tokio::spawn(async move {
        let mut lines = BufReader::new(file).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::info!(parent: log.span(), stream, "{line}"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(parent: log.span(), stream, error = %e, "output capture ended");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::testing::LogCapture;

    #[tokio::test]
    async fn readers_finish_when_writers_close() {
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();

        let mut out = std::fs::File::from(io.stdout);
        writeln!(out, "hello").unwrap();
        drop(out);
        drop(io.stderr);

        for reader in capture.readers {
            reader.await.unwrap();
        }
    }

    #[tokio::test]
    async fn finish_forwards_lines_left_in_the_pipe() {
        let logs = LogCapture::install();
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();

        let mut err = std::fs::File::from(io.stderr);
        writeln!(err, "panic: out of memory").unwrap();
        drop(err);
        drop(io.stdout);

        capture.finish(Duration::from_secs(1)).await;
        assert!(logs.contains("panic: out of memory"));
        assert!(logs.contains("stderr"));
    }

    // Real time: the blocked pipe read keeps a paused clock from advancing.
    #[tokio::test]
    async fn finish_gives_up_on_a_pipe_that_stays_open() {
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();
        capture.finish(Duration::from_millis(100)).await;
        drop(io);
    }

    #[tokio::test]
    async fn close_while_writers_open_does_not_block() {
        let (capture, io) = OutputCapture::open(&Logger::detached()).unwrap();
        capture.close();
        drop(io);
    }
}
