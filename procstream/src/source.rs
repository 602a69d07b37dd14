//! Data source: merges a process's two output channels into one event stream.
//!
//! A single pump task owns the closed-flags and the error buffer, so every
//! arrival is classified strictly one at a time without a lock. The pump
//! emits each data line as it arrives, accumulates error text, and emits one
//! finalization event once both channels have closed.

use crate::config::ExecutorConfig;
use crate::errors::Error;
use crate::filter::ErrorFilter;
use crate::reception::{classify, Arrival, ChannelFlags, ReceptionState};
use procstream_host::{Channel, LineEvent, OutputStreams, ProcessHost};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An event published by a [`DataSource`].
#[derive(Debug)]
pub enum SourceEvent {
    /// A data line, or error text reclassified as benign by the filter.
    DataReceived(String),
    /// The run failed; always the last event.
    ErrorReceived(Error),
    /// Both channels closed without error; always the last event.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Open,
    Stopped,
    Disposed,
}

struct Inner<H> {
    host: H,
    lifecycle: Lifecycle,
    pump: Option<JoinHandle<()>>,
}

/// Owns one process host and publishes its merged output.
pub struct DataSource<H: ProcessHost> {
    inner: tokio::sync::Mutex<Inner<H>>,
    events: std::sync::Mutex<Option<mpsc::Receiver<SourceEvent>>>,
    cancel: CancellationToken,
    pid: Option<u32>,
}

impl<H: ProcessHost> DataSource<H> {
    /// Takes the host's output streams and starts the pump task.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the host's outputs were already taken; the
    /// host is disposed in that case.
    pub fn new(
        mut host: H,
        filter: Option<Arc<dyn ErrorFilter>>,
        config: &ExecutorConfig,
    ) -> Result<Self, Error> {
        let Some(outputs) = host.take_outputs() else {
            host.dispose();
            return Err(Error::Internal(
                "process host outputs were already taken".to_string(),
            ));
        };

        let pid = host.pid();
        let (events_tx, events_rx) = mpsc::channel(config.channel_capacity.max(1));
        let cancel = CancellationToken::new();

        let pump = Pump {
            outputs,
            filter,
            events: events_tx,
            cancel: cancel.clone(),
            flags: ChannelFlags::default(),
            errors: ErrorBuffer::new(config.max_error_bytes),
            data_drained: false,
            error_drained: false,
            pid,
        };
        let pump = tokio::spawn(pump.run());

        Ok(Self {
            inner: tokio::sync::Mutex::new(Inner {
                host,
                lifecycle: Lifecycle::Open,
                pump: Some(pump),
            }),
            events: std::sync::Mutex::new(Some(events_rx)),
            cancel,
            pid,
        })
    }

    /// OS process id of the underlying host, if known.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Hands out the event stream. Only one subscriber is ever supported.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySubscribed` on the second call.
    pub fn subscribe(&self) -> Result<mpsc::Receiver<SourceEvent>, Error> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| Error::Internal("event slot lock poisoned".to_string()))?;
        events.take().ok_or(Error::AlreadySubscribed)
    }

    /// Stops receiving and terminates the process.
    ///
    /// The pump is cancelled first so nothing is delivered once stopping has
    /// begun. Calling `stop` again after it succeeded is a no-op; a failed stop
    /// may be retried.
    ///
    /// # Errors
    ///
    /// Returns `Error::Disposed` after [`DataSource::dispose`], or
    /// `Error::Shutdown` if the host fails to stop.
    pub async fn stop(&self) -> Result<(), Error> {
        let mut inner = self.inner.lock().await;
        match inner.lifecycle {
            Lifecycle::Disposed => return Err(Error::Disposed("DataSource")),
            Lifecycle::Stopped => return Ok(()),
            Lifecycle::Open => {}
        }

        self.unsubscribe(&mut inner).await;
        inner.host.request_stop().await.map_err(Error::Shutdown)?;
        let exit_code = inner.host.await_exit().await.map_err(Error::Shutdown)?;
        inner.lifecycle = Lifecycle::Stopped;

        tracing::debug!(
            event = "data_source_stopped",
            pid = ?self.pid,
            exit_code = ?exit_code,
            "data_source_stopped"
        );
        Ok(())
    }

    /// Unsubscribes and releases the host. Idempotent.
    pub async fn dispose(&self) {
        let mut inner = self.inner.lock().await;
        if inner.lifecycle == Lifecycle::Disposed {
            return;
        }
        inner.lifecycle = Lifecycle::Disposed;
        self.unsubscribe(&mut inner).await;
        inner.host.dispose();

        tracing::debug!(event = "data_source_disposed", pid = ?self.pid, "data_source_disposed");
    }

    async fn unsubscribe(&self, inner: &mut Inner<H>) {
        self.cancel.cancel();
        if let Some(pump) = inner.pump.take() {
            if let Err(e) = pump.await {
                if e.is_panic() {
                    tracing::error!(event = "pump_panicked", pid = ?self.pid, error = %e, "pump_panicked");
                }
            }
        }
    }
}

impl<H: ProcessHost> Drop for DataSource<H> {
    fn drop(&mut self) {
        self.cancel.cancel();
        let inner = self.inner.get_mut();
        if inner.lifecycle != Lifecycle::Disposed {
            inner.lifecycle = Lifecycle::Disposed;
            inner.host.dispose();
        }
    }
}

impl<H: ProcessHost> std::fmt::Debug for DataSource<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("pid", &self.pid)
            .field("canceled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Append-only error text, bounded in bytes.
///
/// Once a fragment overflows the limit nothing more is appended, so the
/// text is always a prefix of what the process wrote.
#[derive(Debug)]
struct ErrorBuffer {
    text: String,
    limit: usize,
    truncated: bool,
}

impl ErrorBuffer {
    const fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, fragment: &str) {
        if self.truncated {
            return;
        }
        if self.text.len() + fragment.len() > self.limit {
            self.truncated = true;
        } else {
            self.text.push_str(fragment);
        }
    }
}

struct Pump {
    outputs: OutputStreams,
    filter: Option<Arc<dyn ErrorFilter>>,
    events: mpsc::Sender<SourceEvent>,
    cancel: CancellationToken,
    flags: ChannelFlags,
    errors: ErrorBuffer,
    data_drained: bool,
    error_drained: bool,
    pid: Option<u32>,
}

impl Pump {
    async fn run(mut self) {
        loop {
            let (channel, item) = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::trace!(event = "pump_canceled", pid = ?self.pid, "pump_canceled");
                    return;
                }
                item = self.outputs.data.recv(), if !self.data_drained => (Channel::Data, item),
                item = self.outputs.error.recv(), if !self.error_drained => (Channel::Error, item),
            };

            let arrival = match item {
                Some(LineEvent::Line(text)) => Arrival::Line(channel, text),
                Some(LineEvent::Closed) => Arrival::Closed(channel),
                None => {
                    match channel {
                        Channel::Data => self.data_drained = true,
                        Channel::Error => self.error_drained = true,
                    }
                    if self.flags.is_closed(channel) {
                        continue;
                    }
                    // The producer went away without a closing signal.
                    Arrival::Closed(channel)
                }
            };

            if self.handle(arrival).await.is_break() {
                return;
            }
        }
    }

    async fn handle(&mut self, arrival: Arrival) -> ControlFlow<()> {
        let (flags, verdict) = classify(self.flags, &arrival);
        self.flags = flags;

        match verdict {
            ReceptionState::DataReceived => match arrival {
                Arrival::Line(_, text) => self.emit(SourceEvent::DataReceived(text)).await,
                Arrival::Closed(_) => self.fail("data verdict for a closing signal").await,
            },
            ReceptionState::ErrorReceived => match arrival {
                Arrival::Line(_, text) if self.is_benign(&text) => {
                    self.emit(SourceEvent::DataReceived(text)).await
                }
                Arrival::Line(_, text) => {
                    self.errors.push(&text);
                    ControlFlow::Continue(())
                }
                Arrival::Closed(_) => self.fail("error verdict for a closing signal").await,
            },
            ReceptionState::ReceivingStopped => {
                self.finish().await;
                ControlFlow::Break(())
            }
            ReceptionState::Undefined => self.fail("reception state machine gave no verdict").await,
            ReceptionState::Nothing => {
                if let Arrival::Line(channel, _) = &arrival {
                    tracing::trace!(
                        event = "arrival_ignored",
                        pid = ?self.pid,
                        channel = %channel,
                        "arrival_ignored"
                    );
                }
                ControlFlow::Continue(())
            }
        }
    }

    fn is_benign(&self, fragment: &str) -> bool {
        self.filter.as_ref().is_some_and(|f| f.filter(fragment))
    }

    async fn finish(&mut self) {
        let truncated = self.errors.truncated;
        let assembled = std::mem::take(&mut self.errors.text);

        if assembled.is_empty() && !truncated {
            tracing::debug!(event = "receiving_completed", pid = ?self.pid, "receiving_completed");
            let _ = self.emit(SourceEvent::Completed).await;
            return;
        }

        // Truncated text is never judged benign.
        let benign = !truncated
            && !assembled.is_empty()
            && self
                .filter
                .as_ref()
                .is_some_and(|f| f.final_filter(&assembled));

        if benign {
            tracing::debug!(event = "error_text_filtered", pid = ?self.pid, "error_text_filtered");
            if self
                .emit(SourceEvent::DataReceived(assembled))
                .await
                .is_continue()
            {
                let _ = self.emit(SourceEvent::Completed).await;
            }
            return;
        }

        tracing::debug!(
            event = "receiving_failed",
            pid = ?self.pid,
            error_bytes = assembled.len(),
            truncated,
            "receiving_failed"
        );
        let _ = self
            .emit(SourceEvent::ErrorReceived(Error::Process {
                message: assembled,
                truncated,
            }))
            .await;
    }

    async fn fail(&self, reason: &str) -> ControlFlow<()> {
        tracing::error!(event = "internal_consistency_failure", pid = ?self.pid, reason, "internal_consistency_failure");
        let _ = self
            .emit(SourceEvent::ErrorReceived(Error::Internal(reason.to_string())))
            .await;
        ControlFlow::Break(())
    }

    /// Publishes `event`; breaks if the source is being stopped.
    async fn emit(&self, event: SourceEvent) -> ControlFlow<()> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => ControlFlow::Break(()),
            sent = self.events.send(event) => {
                if sent.is_err() {
                    tracing::trace!(event = "no_subscriber", pid = ?self.pid, "no_subscriber");
                }
                ControlFlow::Continue(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_buffer_concatenates_fragments() {
        let mut buffer = ErrorBuffer::new(1024);
        buffer.push("E1");
        buffer.push("E2");
        buffer.push("");
        assert_eq!(buffer.text, "E1E2");
        assert!(!buffer.truncated);
    }

    #[test]
    fn test_error_buffer_drops_overflow() {
        let mut buffer = ErrorBuffer::new(4);
        buffer.push("abc");
        buffer.push("de");
        buffer.push("f");
        assert_eq!(buffer.text, "abc");
        assert!(buffer.truncated);
    }
}
