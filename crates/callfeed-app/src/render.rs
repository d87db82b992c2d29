//! Terminal rendering of feed views.

use crate::config::RenderConfig;
use callfeed_core::Message;
use callfeed_feed::{FeedStatus, FeedView};
use chrono::Local;
use std::fmt::Write as _;

const TITLE: &str = "Trading Calls Feed";
const CLEAR: &str = "\x1b[2J\x1b[H";

/// Draws complete frames from `FeedView`s.
#[derive(Debug, Clone)]
pub struct Renderer {
    config: RenderConfig,
    last_revision: Option<u64>,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            last_revision: None,
        }
    }

    /// Frame for `view`, or `None` if that revision was already drawn.
    pub fn next_frame(&mut self, view: &FeedView) -> Option<String> {
        if self.last_revision == Some(view.revision) {
            return None;
        }
        self.last_revision = Some(view.revision);
        Some(self.frame(view))
    }

    /// Render one full frame.
    pub fn frame(&self, view: &FeedView) -> String {
        let mut out = String::new();
        if self.config.clear_screen {
            out.push_str(CLEAR);
        }
        let _ = writeln!(out, "{TITLE}");
        let _ = writeln!(out, "{}", self.status_line(view));

        for message in view.messages.iter().take(self.config.max_rows) {
            out.push('\n');
            self.write_message(&mut out, message);
        }

        let hidden = view.len().saturating_sub(self.config.max_rows);
        if hidden > 0 {
            let _ = writeln!(out, "\n... {hidden} older");
        }
        out
    }

    fn status_line(&self, view: &FeedView) -> String {
        match (view.status, &view.last_error) {
            (FeedStatus::Loading, _) => "Loading feed...".to_string(),
            (FeedStatus::Error, Some(e)) => format!("Error: {e}"),
            (FeedStatus::Error, None) => "Error".to_string(),
            (FeedStatus::Ready, _) => format!("{} messages", view.len()),
        }
    }

    fn write_message(&self, out: &mut String, message: &Message) {
        let _ = writeln!(
            out,
            "{}  {}",
            message.channel.name,
            self.format_time(message)
        );
        for line in message.body.lines() {
            let _ = writeln!(out, "  {line}");
        }
    }

    pub fn format_time(&self, message: &Message) -> String {
        let format = self.config.time_format.as_str();
        if self.config.local_time {
            message.created_at.with_timezone(&Local).format(format).to_string()
        } else {
            message.created_at.format(format).to_string()
        }
    }
}
