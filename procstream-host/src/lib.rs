//! Process host for `procstream`.
//!
//! A host owns one child process and exposes its stdout and stderr as two
//! independent queues of [`LineEvent`]s, each ending with a single
//! [`LineEvent::Closed`]. The [`ProcessHost`] / [`HostFactory`] traits are the
//! seam the executor depends on; [`TokioHostFactory`] is the production
//! implementation.

/// Argument string splitting.
pub mod cmd;
/// Program path resolution.
pub mod discovery;
/// Error types returned by host operations.
pub mod error;
/// The host and factory traits.
pub mod host;
/// Tokio subprocess implementation with graceful shutdown.
pub mod process;
/// Channels, line events and spawn settings.
pub mod types;

pub use cmd::split_args;
pub use discovery::resolve_program;
pub use error::HostError;
pub use host::{HostFactory, ProcessHost};
pub use process::{TokioHostFactory, TokioProcessHost};
pub use types::*;
