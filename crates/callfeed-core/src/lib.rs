//! Core message model for the trading-calls feed.
//!
//! This crate provides the types shared by every other crate:
//! - `Message`: one trading call as published by a channel
//! - `MessageId`, `ChannelId`: opaque identifiers normalized from the wire
//! - `MalformedMessage`: parse failure for a single wire record
//! - `BoxFuture`: boxed future used by the dyn-compatible source traits

pub mod error;
pub mod message;

pub use error::{MalformedMessage, ParseResult};
pub use message::{Channel, ChannelId, Message, MessageId};

use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
