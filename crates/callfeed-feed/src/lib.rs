//! Feed synchronization for the calls feed.
//!
//! Merges a one-shot snapshot with the live stream into a single
//! deduplicated, newest-first message sequence:
//! - `FeedState`: pure single-writer state machine over `FeedEvent`s
//! - `spawn_feed`: actor task driving fetch and subscription concurrently
//! - `FeedView`: immutable render boundary published through `watch`

pub mod driver;
pub mod error;
pub mod state;
pub mod view;

pub use driver::{spawn_feed, FeedConfig, FeedHandle};
pub use error::FeedError;
pub use state::{FeedEvent, FeedState};
pub use view::{FeedStatus, FeedView};
