//! The process host capability: one spawned process and its two output queues.

use crate::error::HostError;
use crate::types::{OutputStreams, SpawnSpec};
use async_trait::async_trait;

/// Owns exactly one OS process.
///
/// The host pushes each output line into the per-stream queues returned by
/// [`ProcessHost::take_outputs`], followed by one [`crate::LineEvent::Closed`]
/// per stream.
#[async_trait]
pub trait ProcessHost: Send + 'static {
    /// OS process id, if known.
    fn pid(&self) -> Option<u32>;

    /// Hands out the output queues. Returns `None` once they have been taken.
    fn take_outputs(&mut self) -> Option<OutputStreams>;

    /// Returns `true` once the process has exited.
    fn has_exited(&mut self) -> bool;

    /// Forcefully stops the process. A process that already exited is not an error.
    async fn request_stop(&mut self) -> Result<(), HostError>;

    /// Waits for the process to exit and returns its exit code when it has one.
    async fn await_exit(&mut self) -> Result<Option<i32>, HostError>;

    /// Releases the process and its readers. Safe to call more than once.
    fn dispose(&mut self);
}

/// Spawns process hosts.
#[async_trait]
pub trait HostFactory: Send + Sync {
    /// The host type produced by this factory.
    type Host: ProcessHost;

    /// Starts a new process described by `spec`.
    async fn spawn(&self, spec: &SpawnSpec) -> Result<Self::Host, HostError>;
}
