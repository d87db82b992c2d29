//! Integration tests for callfeed-ws.
//!
//! These run a real subscriber against a scripted local WebSocket server.

pub mod common;
