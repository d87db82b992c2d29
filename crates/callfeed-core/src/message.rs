//! Feed message records.
//!
//! Wire format (one record per snapshot array element or stream frame):
//! `{"id": 42, "body": "...", "created_at": "2024-05-01T12:00:00Z",
//!   "channel": {"id": 7, "name": "Alpha Calls"}}`
//!
//! Identifiers may arrive as JSON integers or strings; both are normalized
//! to an opaque string so that the same logical event compares equal no
//! matter which endpoint delivered it.

use crate::error::{MalformedMessage, ParseResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Naive timestamp layouts accepted in addition to RFC 3339 (interpreted as UTC).
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Opaque message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque channel identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ChannelId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// Originating channel of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Upstream channel id, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ChannelId>,
    /// Display name.
    pub name: String,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }

    pub fn with_id(id: impl Into<ChannelId>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
        }
    }
}

/// One trading call.
///
/// Identity is `id` alone: two records with the same id are the same logical
/// event, whatever else they carry.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub channel: Channel,
    /// Free-form text; newlines are preserved as received.
    pub body: String,
    /// Origination time, also the ordering key.
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Message {}

impl Message {
    pub fn new(
        id: impl Into<MessageId>,
        channel: Channel,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            channel,
            body: body.into(),
            created_at,
        }
    }

    /// Parse a single record from its JSON text.
    pub fn from_json(text: &str) -> ParseResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| MalformedMessage::InvalidJson(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Parse a single record from an already decoded JSON value.
    pub fn from_value(value: &Value) -> ParseResult<Self> {
        let obj = value.as_object().ok_or(MalformedMessage::NotAnObject)?;

        let id = match obj.get("id") {
            None | Some(Value::Null) => return Err(MalformedMessage::MissingField("id")),
            Some(raw) => MessageId(parse_identifier("id", raw)?),
        };

        let channel = match obj.get("channel") {
            None | Some(Value::Null) => return Err(MalformedMessage::MissingField("channel")),
            Some(raw) => parse_channel(raw)?,
        };

        let body = match obj.get("body") {
            None | Some(Value::Null) => return Err(MalformedMessage::MissingField("body")),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(MalformedMessage::InvalidField {
                    field: "body",
                    reason: format!("expected string, got {}", json_kind(other)),
                })
            }
        };

        let created_at = match obj.get("created_at") {
            None | Some(Value::Null) => {
                return Err(MalformedMessage::MissingField("created_at"))
            }
            Some(Value::String(s)) => parse_timestamp(s)?,
            Some(other) => return Err(MalformedMessage::InvalidTimestamp(other.to_string())),
        };

        Ok(Self {
            id,
            channel,
            body,
            created_at,
        })
    }
}

fn parse_channel(raw: &Value) -> ParseResult<Channel> {
    let obj = raw.as_object().ok_or_else(|| MalformedMessage::InvalidField {
        field: "channel",
        reason: format!("expected object, got {}", json_kind(raw)),
    })?;

    let name = match obj.get("name") {
        None | Some(Value::Null) => return Err(MalformedMessage::MissingField("channel.name")),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return Err(MalformedMessage::InvalidField {
                field: "channel.name",
                reason: format!("expected string, got {}", json_kind(other)),
            })
        }
    };

    let id = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(ChannelId(parse_identifier("channel.id", raw)?)),
    };

    Ok(Channel { id, name })
}

fn parse_identifier(field: &'static str, raw: &Value) -> ParseResult<String> {
    match raw {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        other => Err(MalformedMessage::InvalidField {
            field,
            reason: format!("expected integer or non-empty string, got {}", json_kind(other)),
        }),
    }
}

fn parse_timestamp(raw: &str) -> ParseResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| MalformedMessage::InvalidTimestamp(raw.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
