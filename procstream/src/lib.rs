//! # procstream
//!
//! Run an external process and consume its stdout and stderr as one ordered
//! stream of values, bounded by a timeout and an external cancellation signal.
//!
//! Each stdout line is delivered to the command as it arrives. Stderr text is
//! buffered and reported as a single error once both streams have closed,
//! unless an [`ErrorFilter`] reclassifies it as ordinary output. Whatever the
//! outcome, the process is stopped and released before execution returns.
//!
//! ## Example
//!
//! ```no_run
//! # use procstream::prelude::*;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let spec = CommandSpec::with_args("git", "log --oneline -n 20")?;
//! let mut command = CollectLines::new(spec).take(5);
//!
//! procstream::executor().run(&mut command).await?;
//! for line in command.lines() {
//!     println!("{line}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

/// Commands, their configuration and lifecycle state.
pub mod command;

/// Executor configuration.
pub mod config;

/// Public error types.
pub mod errors;

/// Command execution.
pub mod executor;

/// Data source construction.
pub mod factory;

/// Error filters.
pub mod filter;

/// Commonly used types and traits.
pub mod prelude;

/// The reception state machine.
pub mod reception;

/// Merged process output.
pub mod source;

/// The consumer handle over a data source.
pub mod token;

pub use command::{CollectLines, Command, CommandSpec, CommandState, Flow, FnCommand};
pub use config::ExecutorConfig;
pub use errors::{AggregateError, Error};
pub use executor::CommandExecutor;
pub use factory::{DataSourceFactory, ProcessDataSourceFactory};
pub use filter::{ErrorFilter, FnErrorFilter};
pub use source::{DataSource, SourceEvent};
pub use token::{Notification, WorkToken};

pub use procstream_host as host;
pub use tokio_util::sync::CancellationToken;

/// An executor for real OS processes with default settings.
#[must_use]
pub fn executor() -> CommandExecutor<ProcessDataSourceFactory<host::TokioHostFactory>> {
    CommandExecutor::tokio()
}
