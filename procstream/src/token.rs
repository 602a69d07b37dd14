//! Work token: the single consumer handle over a data source's events.

use crate::errors::Error;
use crate::source::{DataSource, SourceEvent};
use futures::StreamExt;
use procstream_host::ProcessHost;
use tokio_stream::wrappers::ReceiverStream;

/// What a [`WorkToken`] hands to its consumer.
#[derive(Debug)]
pub enum Notification {
    /// One output value.
    Value(String),
    /// The run failed. Nothing follows.
    Error(Error),
    /// The run finished. Nothing follows.
    Completed,
}

impl From<SourceEvent> for Notification {
    fn from(event: SourceEvent) -> Self {
        match event {
            SourceEvent::DataReceived(value) => Self::Value(value),
            SourceEvent::ErrorReceived(error) => Self::Error(error),
            SourceEvent::Completed => Self::Completed,
        }
    }
}

/// Subscribes to one [`DataSource`] and re-exposes its events.
///
/// Cancelling the token stops the source. Disposing it only unsubscribes.
pub struct WorkToken<'a, H: ProcessHost> {
    source: Option<&'a DataSource<H>>,
    events: Option<ReceiverStream<SourceEvent>>,
}

impl<'a, H: ProcessHost> WorkToken<'a, H> {
    /// Subscribes to `source`.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadySubscribed` if the source already has a token.
    pub fn new(source: &'a DataSource<H>) -> Result<Self, Error> {
        let events = source.subscribe()?;
        Ok(Self {
            source: Some(source),
            events: Some(ReceiverStream::new(events)),
        })
    }

    /// Waits for the next notification.
    ///
    /// Returns `None` once disposed, or when the source went away without
    /// sending a terminal event.
    pub async fn next(&mut self) -> Option<Notification> {
        let events = self.events.as_mut()?;
        events.next().await.map(Notification::from)
    }

    /// Stops the underlying data source and awaits the stop.
    ///
    /// # Errors
    ///
    /// Returns `Error::Disposed` after [`WorkToken::dispose`], otherwise any
    /// error from [`DataSource::stop`].
    pub async fn cancel(&self) -> Result<(), Error> {
        let source = self.source.ok_or(Error::Disposed("WorkToken"))?;
        source.stop().await
    }

    /// Unsubscribes. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.events.take().is_some() {
            tracing::trace!(event = "token_disposed", "token_disposed");
        }
        self.source = None;
    }

    /// `true` once [`WorkToken::dispose`] has run.
    #[must_use]
    pub const fn is_disposed(&self) -> bool {
        self.source.is_none()
    }
}

impl<H: ProcessHost> std::fmt::Debug for WorkToken<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkToken")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
