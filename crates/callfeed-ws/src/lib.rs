//! WebSocket stream subscriber for the calls feed.
//!
//! Provides the push half of feed synchronization:
//! - One subscriber per connection, modeled as a closed state machine
//! - Message frames surfaced as a lazy, non-restartable event sequence
//! - Malformed frames skipped without closing the connection
//! - Heartbeat monitoring (idle ping, pong timeout detection)
//! - Exponential backoff policy for the owner's reconnect decisions

pub mod backoff;
pub mod connection;
pub mod error;
pub mod event;
pub mod frame;
pub mod heartbeat;
pub mod source;
pub mod state;

pub use backoff::ReconnectPolicy;
pub use connection::{stream_url_for_origin, StreamConfig, StreamSubscriber};
pub use error::StreamError;
pub use event::StreamEvent;
pub use frame::{classify, InboundFrame};
pub use source::{
    DynStreamSource, MockStreamSource, ScriptedStream, StreamSource, StreamSubscription,
    WsStreamSource,
};
pub use state::{ConnectionState, InvalidTransition, Transition};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any `wss://` or `https://` connection is made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
