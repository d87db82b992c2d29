//! Inbound frame classification.
//!
//! The server pushes one Message record per text frame and may interleave
//! `{"type":"ping"}` keepalives. Everything else is malformed.

use callfeed_core::{MalformedMessage, Message, ParseResult};
use serde_json::Value;

/// A classified inbound text frame.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// Application-level keepalive; proves liveness, carries no data.
    Keepalive,
    /// A feed message.
    Message(Message),
}

/// Classify one text frame.
pub fn classify(text: &str) -> ParseResult<InboundFrame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedMessage::InvalidJson(e.to_string()))?;

    if is_keepalive(&value) {
        return Ok(InboundFrame::Keepalive);
    }

    Message::from_value(&value).map(InboundFrame::Message)
}

fn is_keepalive(value: &Value) -> bool {
    value.get("id").is_none()
        && value
            .get("type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t == "ping" || t == "pong")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_frame() {
        assert!(matches!(
            classify(r#"{"type":"ping"}"#),
            Ok(InboundFrame::Keepalive)
        ));
    }

    #[test]
    fn test_message_frame() {
        let raw = r#"{"id":9,"body":"SELL ETH","created_at":"2024-05-01T12:00:00Z","channel":{"id":1,"name":"Alpha"}}"#;
        match classify(raw) {
            Ok(InboundFrame::Message(msg)) => assert_eq!(msg.id.as_str(), "9"),
            other => panic!("expected message, got {other:?}"),
        }
    }

    #[test]
    fn test_message_with_type_field_is_not_keepalive() {
        let raw = r#"{"id":9,"type":"ping","body":"x","created_at":"2024-05-01T12:00:00Z","channel":{"name":"Alpha"}}"#;
        assert!(matches!(classify(raw), Ok(InboundFrame::Message(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            classify("hello"),
            Err(MalformedMessage::InvalidJson(_))
        ));
        assert!(matches!(
            classify(r#"{"type":"unknown"}"#),
            Err(MalformedMessage::MissingField("id"))
        ));
    }
}
