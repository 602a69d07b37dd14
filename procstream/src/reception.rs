//! Reception state machine.
//!
//! A pure decision function: given which channels have already closed and
//! what just arrived, it returns the updated closed-flags and a one-shot
//! verdict for that single arrival. There is no persistent mode; the caller
//! threads the flags through its loop and acts on each verdict once.

use procstream_host::Channel;

/// Verdict for a single arrival.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReceptionState {
    /// No decision yet.
    #[default]
    Undefined,
    /// Ignore the arrival: its channel already closed, or only one channel has closed so far.
    Nothing,
    /// A data-channel line to deliver.
    DataReceived,
    /// An error-channel fragment to buffer.
    ErrorReceived,
    /// Both channels have closed.
    ReceivingStopped,
}

/// Something pushed by one of the two output channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// A line of text on `Channel`.
    Line(Channel, String),
    /// The closing signal of `Channel`.
    Closed(Channel),
}

impl Arrival {
    /// The channel that produced this arrival.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        match self {
            Self::Line(channel, _) | Self::Closed(channel) => *channel,
        }
    }
}

/// Closed-flags for the two channels. Once set, a flag never clears.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ChannelFlags {
    /// The data channel has signalled closure.
    pub data_closed: bool,
    /// The error channel has signalled closure.
    pub error_closed: bool,
}

impl ChannelFlags {
    /// Both channels have signalled closure.
    #[must_use]
    pub const fn all_closed(self) -> bool {
        self.data_closed && self.error_closed
    }

    /// Whether `channel` has signalled closure.
    #[must_use]
    pub const fn is_closed(self, channel: Channel) -> bool {
        match channel {
            Channel::Data => self.data_closed,
            Channel::Error => self.error_closed,
        }
    }

    #[must_use]
    const fn with_closed(self, channel: Channel) -> Self {
        match channel {
            Channel::Data => Self {
                data_closed: true,
                ..self
            },
            Channel::Error => Self {
                error_closed: true,
                ..self
            },
        }
    }
}

/// Classifies one arrival.
///
/// | arrival | condition | verdict |
/// |---|---|---|
/// | closing signal | other channel closed | `ReceivingStopped` |
/// | closing signal | other channel open | `Nothing` |
/// | line | own channel closed | `Nothing` |
/// | data line | data open | `DataReceived` |
/// | error line | error open | `ErrorReceived` |
///
/// Never returns [`ReceptionState::Undefined`].
#[must_use]
pub fn classify(flags: ChannelFlags, arrival: &Arrival) -> (ChannelFlags, ReceptionState) {
    match arrival {
        Arrival::Closed(channel) => {
            let next = flags.with_closed(*channel);
            let verdict = if next.all_closed() {
                ReceptionState::ReceivingStopped
            } else {
                ReceptionState::Nothing
            };
            (next, verdict)
        }
        Arrival::Line(channel, _) if flags.is_closed(*channel) => (flags, ReceptionState::Nothing),
        Arrival::Line(Channel::Data, _) => (flags, ReceptionState::DataReceived),
        Arrival::Line(Channel::Error, _) => (flags, ReceptionState::ErrorReceived),
    }
}
