//! Public error types for procstream.

use crate::command::CommandState;
use procstream_host::HostError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while configuring or executing a command.
///
/// Failures that happen before anything runs (usage errors, spawn failures,
/// a cancellation that was already signalled) are returned directly. Failures
/// collected during a run are returned together as [`Error::Aggregate`].
#[derive(Debug, Error)]
pub enum Error {
    /// The command was not in the `NotStarted` state when execution was requested.
    #[error("Command cannot be executed from state {0:?}; it must be NotStarted")]
    InvalidState(CommandState),

    /// The command configuration is invalid (empty path or arguments).
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// The process could not be started.
    #[error("Failed to start process: {0}")]
    Spawn(#[source] HostError),

    /// The process wrote unfiltered text to its error stream.
    #[error("Process reported an error: {message}")]
    Process {
        /// The assembled error text.
        message: String,
        /// Whether fragments were dropped because the error buffer was full.
        truncated: bool,
    },

    /// No terminal event arrived within the command's timeout.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    /// The external cancellation signal fired.
    #[error("Command was canceled")]
    Canceled,

    /// Stopping or releasing the process failed.
    #[error("Failed to shut down process: {0}")]
    Shutdown(#[source] HostError),

    /// An object was used after it had been disposed.
    #[error("{0} has already been disposed")]
    Disposed(&'static str),

    /// A data source can only be observed by one subscriber.
    #[error("Data source already has a subscriber")]
    AlreadySubscribed,

    /// The reception state machine or event stream reached an impossible state.
    #[error("Internal consistency failure: {0}")]
    Internal(String),

    /// Every failure recorded during one execution.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl Error {
    /// Returns `true` if this error is, or aggregates, a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.any(|e| matches!(e, Self::Timeout(_)))
    }

    /// Returns `true` if this error is, or aggregates, a cancellation.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.any(|e| matches!(e, Self::Canceled))
    }

    /// Returns `true` if `predicate` holds for this error or any aggregated one.
    pub fn any(&self, mut predicate: impl FnMut(&Self) -> bool) -> bool {
        self.any_dyn(&mut predicate)
    }

    fn any_dyn(&self, predicate: &mut dyn FnMut(&Self) -> bool) -> bool {
        match self {
            Self::Aggregate(aggregate) => aggregate.iter().any(|e| e.any_dyn(&mut *predicate)),
            other => predicate(other),
        }
    }
}

/// Several failures from a single execution, in the order they occurred.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<Error>,
}

impl AggregateError {
    /// Wraps `errors`; returns `None` when there is nothing to report.
    #[must_use]
    pub fn from_errors(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// The recorded failures.
    #[must_use]
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Iterates over the recorded failures.
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Always `false`; an aggregate holds at least one failure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes the aggregate, returning its failures.
    #[must_use]
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [single] => write!(f, "{single}"),
            errors => {
                write!(f, "{} failures: ", errors.len())?;
                for (i, error) in errors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{error}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
