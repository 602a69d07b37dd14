//! Command executor: runs a command to a terminal state.

use crate::command::{Command, CommandState, Flow};
use crate::config::ExecutorConfig;
use crate::errors::{AggregateError, Error};
use crate::factory::{DataSourceFactory, ProcessDataSourceFactory};
use crate::token::{Notification, WorkToken};
use procstream_host::{ProcessHost, TokioHostFactory};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How the observation part of a run ended.
#[derive(Debug)]
enum Outcome {
    Completed,
    Stopped,
    Faulted(Error),
    /// The command asked to stop and stopping the process failed.
    StopFailed(Error),
    TimedOut,
    Canceled,
}

/// Runs commands through a [`DataSourceFactory`].
///
/// Each execution delivers the process's output values to
/// [`Command::on_value`] in order, bounded by the command's timeout and an
/// external [`CancellationToken`]. Whatever the outcome, the process is
/// stopped and released before `execute` returns.
#[derive(Debug, Clone)]
pub struct CommandExecutor<F> {
    factory: F,
}

impl CommandExecutor<ProcessDataSourceFactory<TokioHostFactory>> {
    /// An executor for real OS processes with default settings.
    #[must_use]
    pub fn tokio() -> Self {
        Self::from_config(ExecutorConfig::default())
    }

    /// An executor for real OS processes.
    #[must_use]
    pub fn from_config(config: ExecutorConfig) -> Self {
        Self::new(ProcessDataSourceFactory::tokio(config))
    }
}

impl<F: DataSourceFactory> CommandExecutor<F> {
    /// Wraps `factory`.
    pub const fn new(factory: F) -> Self {
        Self { factory }
    }

    /// The factory used to start processes.
    pub const fn factory(&self) -> &F {
        &self.factory
    }

    /// Executes `command` without an external cancellation signal.
    ///
    /// # Errors
    ///
    /// See [`CommandExecutor::execute`].
    pub async fn run<C>(&self, command: &mut C) -> Result<(), Error>
    where
        C: Command + ?Sized,
    {
        self.execute(command, &CancellationToken::new()).await
    }

    /// Executes `command` once.
    ///
    /// The command must be `NotStarted`. On return it is in `Completed`,
    /// `Faulted`, `Timeout` or `Canceled`, unless the call was rejected
    /// up front.
    ///
    /// # Errors
    ///
    /// Returned directly, without touching any process:
    /// - `Error::InvalidState` if the command already ran
    /// - `Error::Canceled` if `cancel` was already signalled
    /// - `Error::Spawn` if the process could not be started
    ///
    /// Every failure observed once the process runs, including failures to
    /// stop it, is returned together as `Error::Aggregate`.
    #[tracing::instrument(
        name = "execute",
        skip_all,
        fields(
            run_id = %Uuid::new_v4(),
            program = %command.spec().process_path(),
        )
    )]
    pub async fn execute<C>(&self, command: &mut C, cancel: &CancellationToken) -> Result<(), Error>
    where
        C: Command + ?Sized,
    {
        let state = command.spec().state();
        if state != CommandState::NotStarted {
            return Err(Error::InvalidState(state));
        }
        if cancel.is_cancelled() {
            tracing::debug!(event = "rejected_canceled", "rejected_canceled");
            return Err(Error::Canceled);
        }
        command.spec_mut().begin()?;

        let source = match self.factory.create(command.spec()).await {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(event = "spawn_failed", error = %e, "spawn_failed");
                command.spec_mut().finish(CommandState::Faulted);
                return Err(e);
            }
        };
        tracing::debug!(event = "process_started", pid = ?source.pid(), "process_started");

        let timeout = command.spec().timeout();
        let outcome = match WorkToken::new(&source) {
            Ok(mut token) => {
                let outcome = observe(command, &mut token, timeout, cancel).await;
                token.dispose();
                outcome
            }
            Err(e) => Outcome::Faulted(e),
        };

        let mut failures = Vec::new();
        let stop_attempted = matches!(outcome, Outcome::StopFailed(_));
        let terminal = match outcome {
            Outcome::Completed | Outcome::Stopped => CommandState::Completed,
            Outcome::Faulted(e) | Outcome::StopFailed(e) => {
                tracing::warn!(event = "command_faulted", error = %e, "command_faulted");
                failures.push(e);
                CommandState::Faulted
            }
            Outcome::TimedOut => {
                tracing::warn!(event = "command_timed_out", timeout = ?timeout, "command_timed_out");
                failures.push(Error::Timeout(timeout));
                CommandState::Timeout
            }
            Outcome::Canceled => {
                tracing::info!(event = "command_canceled", "command_canceled");
                failures.push(Error::Canceled);
                CommandState::Canceled
            }
        };

        // A failed voluntary stop is already this run's failure; disposal
        // still kills the process.
        if !stop_attempted {
            if let Err(e) = source.stop().await {
                tracing::warn!(event = "shutdown_failed", error = %e, "shutdown_failed");
                failures.push(e);
            }
        }
        source.dispose().await;
        command.spec_mut().finish(terminal);

        tracing::debug!(
            event = "command_finished",
            state = ?terminal,
            failures = failures.len(),
            "command_finished"
        );
        AggregateError::from_errors(failures).map_or(Ok(()), |aggregate| Err(aggregate.into()))
    }
}

/// Races delivery against the timeout and the external signal.
async fn observe<C, H>(
    command: &mut C,
    token: &mut WorkToken<'_, H>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Outcome
where
    C: Command + ?Sized,
    H: ProcessHost,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Outcome::Canceled,
        delivered = tokio::time::timeout(timeout, deliver(command, token)) => {
            delivered.unwrap_or(Outcome::TimedOut)
        }
    }
}

async fn deliver<C, H>(command: &mut C, token: &mut WorkToken<'_, H>) -> Outcome
where
    C: Command + ?Sized,
    H: ProcessHost,
{
    let mut delivered: u64 = 0;
    while let Some(notification) = token.next().await {
        match notification {
            Notification::Value(value) => {
                delivered += 1;
                if command.on_value(&value) == Flow::Stop {
                    tracing::debug!(event = "stop_requested", delivered, "stop_requested");
                    return match token.cancel().await {
                        Ok(()) => Outcome::Stopped,
                        Err(e) => Outcome::StopFailed(e),
                    };
                }
            }
            Notification::Error(e) => return Outcome::Faulted(e),
            Notification::Completed => {
                tracing::debug!(event = "stream_completed", delivered, "stream_completed");
                return Outcome::Completed;
            }
        }
    }
    Outcome::Faulted(Error::Internal(
        "event stream ended without a terminal event".to_string(),
    ))
}
