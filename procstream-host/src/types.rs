//! Shared data types for the process host: channels, line events and spawn settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Bounded capacity of each per-stream line queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Time between SIGTERM and SIGKILL when stopping a process.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// One of the two output streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Standard output.
    Data,
    /// Standard error.
    Error,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Data => f.write_str("stdout"),
            Self::Error => f.write_str("stderr"),
        }
    }
}

/// A single item pushed by the host on one channel.
///
/// Each channel carries any number of `Line`s followed by exactly one `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// One line of output, without its terminator.
    Line(String),
    /// No further lines will arrive on this channel.
    Closed,
}

/// The two line queues of a running process.
///
/// Holding these is the subscription to the process output; dropping them
/// unsubscribes.
#[derive(Debug)]
pub struct OutputStreams {
    /// Lines read from stdout.
    pub data: mpsc::Receiver<LineEvent>,
    /// Lines read from stderr.
    pub error: mpsc::Receiver<LineEvent>,
}

/// What to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnSpec {
    /// Program name or path.
    pub program: String,
    /// Already split argument vector.
    pub args: Vec<String>,
    /// Working directory override.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    /// Creates a spec for `program` with the given arguments.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            ..Self::default()
        }
    }
}

/// Settings applied to every process spawned by a [`crate::TokioHostFactory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// How long a stopped process may take to exit after SIGTERM.
    pub grace_period: Duration,
    /// Capacity of each per-stream line queue.
    pub channel_capacity: usize,
    /// Working directory applied when the spawn spec has none.
    pub cwd: Option<PathBuf>,
    /// Environment variables added to every child.
    pub env: Vec<(String, String)>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            cwd: None,
            env: Vec::new(),
        }
    }
}
