//! Events surfaced by a stream subscription.

use crate::error::StreamError;
use callfeed_core::Message;

/// One item of a subscription's event sequence.
///
/// A subscription yields `Opened` at most once, then any number of
/// `Message`s, then exactly one `Closed`, after which the sequence ends.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connection reached Open.
    Opened,
    /// A message pushed by the server.
    Message(Message),
    /// Terminal event. `None` means closed by explicit teardown.
    Closed(Option<StreamError>),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}
