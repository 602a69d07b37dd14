//! Tokio-backed process host with per-stream reader tasks and graceful shutdown.

use crate::discovery::resolve_program;
use crate::error::HostError;
use crate::host::{HostFactory, ProcessHost};
use crate::types::{Channel, HostConfig, LineEvent, OutputStreams, SpawnSpec};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;

/// Spawns [`TokioProcessHost`]s with a shared [`HostConfig`].
#[derive(Debug, Clone, Default)]
pub struct TokioHostFactory {
    config: HostConfig,
}

impl TokioHostFactory {
    /// Creates a factory using `config` for every spawned process.
    #[must_use]
    pub const fn new(config: HostConfig) -> Self {
        Self { config }
    }

    /// The configuration applied to spawned processes.
    #[must_use]
    pub const fn config(&self) -> &HostConfig {
        &self.config
    }
}

#[async_trait]
impl HostFactory for TokioHostFactory {
    type Host = TokioProcessHost;

    async fn spawn(&self, spec: &SpawnSpec) -> Result<TokioProcessHost, HostError> {
        TokioProcessHost::spawn(spec, &self.config)
    }
}

/// A child process whose stdout and stderr are read line by line.
#[derive(Debug)]
pub struct TokioProcessHost {
    child: Child,
    pid: u32,
    readers: JoinSet<()>,
    outputs: Option<OutputStreams>,
    grace_period: Duration,
    disposed: bool,
}

impl TokioProcessHost {
    /// Spawns `spec` with piped stdout/stderr and starts one reader task per stream.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if the program cannot be resolved or started.
    pub fn spawn(spec: &SpawnSpec, config: &HostConfig) -> Result<Self, HostError> {
        let path = resolve_program(&spec.program)?;

        let mut cmd = Command::new(&path);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = spec.cwd.as_ref().or(config.cwd.as_ref()) {
            cmd.current_dir(cwd);
        }

        for (k, v) in config.env.iter().chain(&spec.env) {
            cmd.env(k, v);
        }

        let mut child = cmd.spawn().map_err(|e| HostError::SpawnFailed {
            stage: "spawn".to_string(),
            source: e,
        })?;

        let stdout = child.stdout.take().ok_or(HostError::NoStdout)?;
        let stderr = child.stderr.take().ok_or(HostError::NoStderr)?;
        let pid = child.id().ok_or(HostError::NoPid)?;

        let capacity = config.channel_capacity.max(1);
        let (data_tx, data_rx) = mpsc::channel(capacity);
        let (error_tx, error_rx) = mpsc::channel(capacity);

        let mut readers = JoinSet::new();
        readers.spawn(forward_lines(stdout, data_tx, Channel::Data, pid));
        readers.spawn(forward_lines(stderr, error_tx, Channel::Error, pid));

        tracing::debug!(
            event = "process_spawned",
            pid,
            program = %path.display(),
            args = ?spec.args,
            "process_spawned"
        );

        Ok(Self {
            child,
            pid,
            readers,
            outputs: Some(OutputStreams {
                data: data_rx,
                error: error_rx,
            }),
            grace_period: config.grace_period,
            disposed: false,
        })
    }
}

#[async_trait]
impl ProcessHost for TokioProcessHost {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn take_outputs(&mut self) -> Option<OutputStreams> {
        self.outputs.take()
    }

    fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(e) => {
                tracing::warn!(event = "try_wait_failed", pid = self.pid, error = %e, "try_wait_failed");
                false
            }
        }
    }

    async fn request_stop(&mut self) -> Result<(), HostError> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        if self.has_exited() {
            tracing::debug!(event = "process_already_exited", pid = self.pid, "process_already_exited");
            return Ok(());
        }

        tracing::debug!(event = "process_stop_requested", pid = self.pid, "process_stop_requested");
        graceful_shutdown(&mut self.child, self.pid, self.grace_period).await
    }

    async fn await_exit(&mut self) -> Result<Option<i32>, HostError> {
        if self.disposed {
            return Err(HostError::Disposed);
        }
        let status = self.child.wait().await.map_err(|e| HostError::SpawnFailed {
            stage: "wait".to_string(),
            source: e,
        })?;
        Ok(status.code())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.outputs = None;
        self.readers.abort_all();

        if !self.has_exited() {
            if let Err(e) = self.child.start_kill() {
                tracing::warn!(event = "dispose_kill_failed", pid = self.pid, error = %e, "dispose_kill_failed");
            }
        }
        tracing::debug!(event = "process_disposed", pid = self.pid, "process_disposed");
    }
}

/// Forwards every line of `stream` to `tx`, then a single `Closed`.
///
/// Lines are decoded lossily; invalid UTF-8 becomes U+FFFD instead of
/// ending the stream. Stops early when the receiver has been dropped.
async fn forward_lines(
    stream: impl AsyncRead + Unpin,
    tx: mpsc::Sender<LineEvent>,
    channel: Channel,
    pid: u32,
) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(LineEvent::Line(decode_line(&buf))).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(
                    event = "stream_read_failed",
                    pid,
                    channel = %channel,
                    error = %e,
                    "stream_read_failed"
                );
                break;
            }
        }
    }

    let _ = tx.send(LineEvent::Closed).await;
}

/// Strips one trailing `\n` or `\r\n` and decodes lossily.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Graceful shutdown: `SIGTERM`, wait grace period, then `SIGKILL`.
#[cfg(unix)]
async fn graceful_shutdown(
    child: &mut Child,
    pid: u32,
    grace_period: Duration,
) -> Result<(), HostError> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw_pid = i32::try_from(pid).map_err(|_| HostError::SignalFailed {
        signal: "SIGTERM".to_string(),
        pid,
        reason: "PID value exceeds i32::MAX".to_string(),
    })?;

    match signal::kill(Pid::from_raw(raw_pid), Signal::SIGTERM) {
        // ESRCH: exited between the liveness check and the signal.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => {
            return Err(HostError::SignalFailed {
                signal: "SIGTERM".to_string(),
                pid,
                reason: e.to_string(),
            });
        }
    }

    match timeout(grace_period, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(event = "process_exited", pid, code = ?status.code(), "process_exited");
            Ok(())
        }
        Ok(Err(e)) => Err(HostError::SpawnFailed {
            stage: "graceful_shutdown wait".to_string(),
            source: e,
        }),
        Err(_) => {
            tracing::warn!(
                event = "grace_period_expired",
                pid,
                grace_period = ?grace_period,
                "grace_period_expired"
            );
            child.kill().await.map_err(|e| HostError::SpawnFailed {
                stage: "SIGKILL".to_string(),
                source: e,
            })?;
            child.wait().await.map_err(|e| HostError::SpawnFailed {
                stage: "post-SIGKILL wait".to_string(),
                source: e,
            })?;
            Ok(())
        }
    }
}

/// Windows: immediate termination, no graceful shutdown for console processes.
#[cfg(windows)]
async fn graceful_shutdown(
    child: &mut Child,
    _pid: u32,
    _grace_period: Duration,
) -> Result<(), HostError> {
    child.kill().await.map_err(|e| HostError::SpawnFailed {
        stage: "TerminateProcess".to_string(),
        source: e,
    })?;
    child.wait().await.map_err(|e| HostError::SpawnFailed {
        stage: "post-kill wait".to_string(),
        source: e,
    })?;
    Ok(())
}
