//! Trading calls feed terminal client.
//!
//! Wires the feed components together:
//! - Snapshot client and stream source built from configuration
//! - Feed actor merging both into one view
//! - Terminal renderer redrawing on every published view

pub mod app;
pub mod config;
pub mod error;
pub mod render;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
