//! Commands: what to run, and what to do with each output value.

use crate::errors::Error;
use crate::filter::ErrorFilter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied when a command does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(50);

/// Lifecycle of a command.
///
/// Moves `NotStarted -> Started` exactly once, then exactly once to one of
/// the terminal states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandState {
    /// Never executed.
    #[default]
    NotStarted,
    /// Currently executing.
    Started,
    /// Finished normally, including a voluntary stop from the command itself.
    Completed,
    /// The external cancellation signal fired.
    Canceled,
    /// The run failed.
    Faulted,
    /// No terminal event arrived within the timeout.
    Timeout,
}

impl CommandState {
    /// `true` for `Completed`, `Canceled`, `Faulted` and `Timeout`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Canceled | Self::Faulted | Self::Timeout
        )
    }
}

/// Returned by [`Command::on_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Flow {
    /// Keep delivering values.
    Continue,
    /// Stop the process; no further values are delivered.
    Stop,
}

/// Immutable configuration of a command plus its lifecycle state.
#[derive(Clone)]
pub struct CommandSpec {
    process_path: String,
    args: String,
    timeout: Duration,
    error_filter: Option<Arc<dyn ErrorFilter>>,
    state: CommandState,
}

impl CommandSpec {
    /// A command with no arguments and the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommand` if `process_path` is empty.
    pub fn new(process_path: impl Into<String>) -> Result<Self, Error> {
        let process_path = process_path.into();
        if process_path.trim().is_empty() {
            return Err(Error::InvalidCommand(
                "process path must not be empty".to_string(),
            ));
        }
        Ok(Self {
            process_path,
            args: String::new(),
            timeout: DEFAULT_TIMEOUT,
            error_filter: None,
            state: CommandState::NotStarted,
        })
    }

    /// A command with an argument string and the default timeout.
    ///
    /// `args` is split shell-style when the process is started.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommand` if either value is empty.
    pub fn with_args(
        process_path: impl Into<String>,
        args: impl Into<String>,
    ) -> Result<Self, Error> {
        Self::with_timeout(process_path, args, DEFAULT_TIMEOUT)
    }

    /// A command with an argument string and an explicit timeout.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCommand` if either string is empty.
    pub fn with_timeout(
        process_path: impl Into<String>,
        args: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let args = args.into();
        if args.trim().is_empty() {
            return Err(Error::InvalidCommand(
                "arguments must not be empty".to_string(),
            ));
        }
        let mut spec = Self::new(process_path)?;
        spec.args = args;
        spec.timeout = timeout;
        Ok(spec)
    }

    /// Attaches an error filter.
    #[must_use]
    pub fn with_error_filter(mut self, filter: impl ErrorFilter + 'static) -> Self {
        self.error_filter = Some(Arc::new(filter));
        self
    }

    /// Attaches an already shared error filter.
    #[must_use]
    pub fn with_shared_error_filter(mut self, filter: Arc<dyn ErrorFilter>) -> Self {
        self.error_filter = Some(filter);
        self
    }

    /// Program to run.
    #[must_use]
    pub fn process_path(&self) -> &str {
        &self.process_path
    }

    /// Unsplit argument string.
    #[must_use]
    pub fn args(&self) -> &str {
        &self.args
    }

    /// Limit on the whole run.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attached error filter, if any.
    #[must_use]
    pub const fn filter(&self) -> Option<&Arc<dyn ErrorFilter>> {
        self.error_filter.as_ref()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }

    pub(crate) fn begin(&mut self) -> Result<(), Error> {
        if self.state != CommandState::NotStarted {
            return Err(Error::InvalidState(self.state));
        }
        self.state = CommandState::Started;
        Ok(())
    }

    pub(crate) fn finish(&mut self, terminal: CommandState) {
        debug_assert!(terminal.is_terminal());
        if self.state == CommandState::Started {
            self.state = terminal;
        }
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("process_path", &self.process_path)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .field("error_filter", &self.error_filter.is_some())
            .field("state", &self.state)
            .finish()
    }
}

/// A command that can be run by a [`CommandExecutor`](crate::CommandExecutor).
///
/// Implementors own a [`CommandSpec`] and receive each output value in order.
pub trait Command: Send {
    /// The command's configuration and state.
    fn spec(&self) -> &CommandSpec;

    /// Mutable access, used by the executor to move the state.
    fn spec_mut(&mut self) -> &mut CommandSpec;

    /// Handles one output value.
    fn on_value(&mut self, value: &str) -> Flow;
}

/// A [`Command`] that forwards each value to a closure.
pub struct FnCommand<F> {
    spec: CommandSpec,
    handler: F,
}

impl<F> FnCommand<F>
where
    F: FnMut(&str) -> Flow + Send,
{
    /// Wraps `spec` and `handler`.
    pub const fn new(spec: CommandSpec, handler: F) -> Self {
        Self { spec, handler }
    }
}

impl<F> Command for FnCommand<F>
where
    F: FnMut(&str) -> Flow + Send,
{
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut CommandSpec {
        &mut self.spec
    }

    fn on_value(&mut self, value: &str) -> Flow {
        (self.handler)(value)
    }
}

impl<F> fmt::Debug for FnCommand<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

/// Collects every value, optionally stopping after a fixed count.
#[derive(Debug)]
pub struct CollectLines {
    spec: CommandSpec,
    lines: Vec<String>,
    limit: Option<usize>,
}

impl CollectLines {
    /// Collects every value the process produces.
    #[must_use]
    pub const fn new(spec: CommandSpec) -> Self {
        Self {
            spec,
            lines: Vec::new(),
            limit: None,
        }
    }

    /// Stops the process once `limit` values have been collected.
    #[must_use]
    pub const fn take(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Values collected so far.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The most recent value, if any.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.lines.last().map(String::as_str)
    }

    /// Consumes the command, returning the collected values.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }
}

impl Command for CollectLines {
    fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut CommandSpec {
        &mut self.spec
    }

    fn on_value(&mut self, value: &str) -> Flow {
        self.lines.push(value.to_string());
        match self.limit {
            Some(limit) if self.lines.len() >= limit => Flow::Stop,
            _ => Flow::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FnErrorFilter;

    #[test]
    fn test_defaults() {
        let spec = CommandSpec::new("git").expect("valid");
        assert_eq!(spec.process_path(), "git");
        assert_eq!(spec.args(), "");
        assert_eq!(spec.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(spec.timeout(), Duration::from_secs(50));
        assert_eq!(spec.state(), CommandState::NotStarted);
        assert!(spec.filter().is_none());
    }

    #[test]
    fn test_empty_values_are_rejected() {
        assert!(matches!(
            CommandSpec::new(""),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            CommandSpec::with_args("git", ""),
            Err(Error::InvalidCommand(_))
        ));
        assert!(matches!(
            CommandSpec::with_timeout("", "status", Duration::from_secs(1)),
            Err(Error::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_explicit_timeout() {
        let spec =
            CommandSpec::with_timeout("git", "status --short", Duration::from_secs(3)).expect("valid");
        assert_eq!(spec.args(), "status --short");
        assert_eq!(spec.timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_filter_is_attached() {
        let spec = CommandSpec::with_args("git", "fetch")
            .expect("valid")
            .with_error_filter(FnErrorFilter::new(|_: &str| false, |t: &str| t.starts_with("From")));
        let filter = spec.filter().expect("filter attached");
        assert!(filter.final_filter("From github.com:org/repo"));
        assert!(!filter.filter("anything"));
    }

    #[test]
    fn test_state_moves_once() {
        let mut spec = CommandSpec::new("git").expect("valid");
        spec.begin().expect("first begin");
        assert_eq!(spec.state(), CommandState::Started);
        assert!(matches!(
            spec.begin(),
            Err(Error::InvalidState(CommandState::Started))
        ));

        spec.finish(CommandState::Timeout);
        spec.finish(CommandState::Completed);
        assert_eq!(spec.state(), CommandState::Timeout);
        assert!(matches!(
            spec.begin(),
            Err(Error::InvalidState(CommandState::Timeout))
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CommandState::NotStarted.is_terminal());
        assert!(!CommandState::Started.is_terminal());
        assert!(CommandState::Completed.is_terminal());
        assert!(CommandState::Canceled.is_terminal());
        assert!(CommandState::Faulted.is_terminal());
        assert!(CommandState::Timeout.is_terminal());
    }

    #[test]
    fn test_collect_lines_stops_at_limit() {
        let spec = CommandSpec::new("seq").expect("valid");
        let mut command = CollectLines::new(spec).take(2);
        assert_eq!(command.on_value("1"), Flow::Continue);
        assert_eq!(command.on_value("2"), Flow::Stop);
        assert_eq!(command.last(), Some("2"));
        assert_eq!(command.into_lines(), vec!["1", "2"]);
    }

    #[test]
    fn test_fn_command_forwards_values() {
        let mut seen = Vec::new();
        {
            let spec = CommandSpec::new("echo").expect("valid");
            let mut command = FnCommand::new(spec, |v: &str| {
                seen.push(v.to_string());
                Flow::Continue
            });
            assert_eq!(command.on_value("a"), Flow::Continue);
            assert_eq!(command.spec().process_path(), "echo");
        }
        assert_eq!(seen, vec!["a"]);
    }
}
