//! Integration tests for callfeed-app.
//!
//! These run the full feed against an in-process origin serving both the
//! snapshot endpoint and the stream endpoint.

pub mod common;
