//! Connection state machine for a single stream subscription.
//!
//! ```text
//! Connecting --Established------> Open
//! Connecting --ConnectFailed(e)--> Closed(Some(e))
//! Open       --Dropped(e)--------> Closed(Some(e))
//! Connecting --Teardown----------> Closed(None)
//! Open       --Teardown----------> Closed(None)
//! ```
//!
//! `Closed` is terminal. Reconnecting means building a new subscriber.

use crate::error::StreamError;
use thiserror::Error;

/// State of one stream connection instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Terminal. `None` when closed by explicit teardown.
    Closed(Option<StreamError>),
}

/// Input to the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Handshake completed.
    Established,
    /// Handshake failed.
    ConnectFailed(StreamError),
    /// Open connection lost.
    Dropped(StreamError),
    /// Owner requested close.
    Teardown,
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Established => "established",
            Self::ConnectFailed(_) => "connect_failed",
            Self::Dropped(_) => "dropped",
            Self::Teardown => "teardown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stream transition '{transition}' from state '{from}'")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub transition: &'static str,
}

impl ConnectionState {
    /// Compute the state after `transition`, rejecting illegal moves.
    pub fn next(&self, transition: Transition) -> Result<ConnectionState, InvalidTransition> {
        match (self, transition) {
            (Self::Connecting, Transition::Established) => Ok(Self::Open),
            (Self::Connecting, Transition::ConnectFailed(e)) => Ok(Self::Closed(Some(e))),
            (Self::Open, Transition::Dropped(e)) => Ok(Self::Closed(Some(e))),
            (Self::Connecting | Self::Open, Transition::Teardown) => Ok(Self::Closed(None)),
            (from, transition) => Err(InvalidTransition {
                from: from.label(),
                transition: transition.label(),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed(_) => "closed",
        }
    }
}
