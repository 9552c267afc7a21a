//! Event model and event-stream frame codec.
//!
//! Frame format (one event):
//! ```text
//! data: {"type":"chunk","partial_content":"..."}\n
//! \n
//! ```
//! Frames are separated by a blank line. Everything between delimiters is
//! opaque to the relay except for [`peek_kind`], which looks at the `type`
//! discriminator to notice terminal events.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Error, ErrorKind};

/// Blank-line frame delimiter.
pub const FRAME_DELIMITER: &[u8] = b"\n\n";

/// Event discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connecting,
    Start,
    Chunk,
    Complete,
    Error,
}

impl EventKind {
    /// `complete` and `error` end a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventKind::Complete | EventKind::Error)
    }
}

/// One streamed event, as seen by the downstream consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Connecting {
        message: String,
    },
    Start {
        message: String,
    },
    Chunk {
        partial_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Complete {
        documentation: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_request: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint_slug: Option<String>,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kind: Option<ErrorKind>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        troubleshooting: Option<BTreeMap<String, String>>,
    },
}

impl Event {
    /// Synthetic status event sent before any upstream I/O.
    pub fn connecting() -> Self {
        Event::Connecting {
            message: "Connecting to backend...".to_string(),
        }
    }

    /// Terminal error event describing `err`.
    pub fn from_error(err: &Error) -> Self {
        Event::Error {
            error: err.to_string(),
            kind: Some(err.kind()),
            status_code: err.upstream_status(),
            troubleshooting: err.troubleshooting(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connecting { .. } => EventKind::Connecting,
            Event::Start { .. } => EventKind::Start,
            Event::Chunk { .. } => EventKind::Chunk,
            Event::Complete { .. } => EventKind::Complete,
            Event::Error { .. } => EventKind::Error,
        }
    }

    /// Render as one event-stream frame: `data: <json>\n\n`.
    pub fn encode(&self) -> Bytes {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Event encoding failed: {}", e);
                r#"{"type":"error","error":"event encoding failed","kind":"Internal"}"#.to_string()
            }
        };
        let mut frame = Vec::with_capacity(json.len() + 8);
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(json.as_bytes());
        frame.extend_from_slice(FRAME_DELIMITER);
        Bytes::from(frame)
    }

    /// Decode the `data:` payload of a frame. Returns `None` for frames that
    /// carry no data lines or whose payload is not a known event.
    pub fn decode(frame: &[u8]) -> Option<Self> {
        serde_json::from_str(&data_payload(frame)?).ok()
    }
}

/// Classify a forwarded frame without re-encoding it.
///
/// Recognises the `type` discriminator and, for backends that report
/// failures without one, a `"status": "error"` body. Other fields are
/// opaque and never affect the result.
pub fn peek_kind(frame: &[u8]) -> Option<EventKind> {
    let payload = data_payload(frame)?;
    let body: serde_json::Value = serde_json::from_str(&payload).ok()?;
    if let Some(kind) = body
        .get("type")
        .and_then(|kind| EventKind::deserialize(kind).ok())
    {
        return Some(kind);
    }
    match body.get("status").and_then(serde_json::Value::as_str) {
        Some("error") => Some(EventKind::Error),
        _ => None,
    }
}

/// Join the `data:` lines of a frame the way an event-stream client would.
fn data_payload(frame: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(frame);
    let mut payload: Option<String> = None;
    for line in text.lines() {
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let value = rest.strip_prefix(' ').unwrap_or(rest);
        match payload.as_mut() {
            Some(p) => {
                p.push('\n');
                p.push_str(value);
            }
            None => payload = Some(value.to_string()),
        }
    }
    payload
}
