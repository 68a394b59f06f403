use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::sse::sse_json_bytes;

/// Downstream envelope emitted by the relay, one per SSE `data:` line.
///
/// `Content` always carries the full text accumulated so far, so each update
/// replaces the previous one. `Done` and `Error` are terminal and mutually
/// exclusive for a given stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Content { content: String },
    Done { model: String },
    Error { error: String },
}

impl StreamEvent {
    pub fn content(text: impl Into<String>) -> Self {
        StreamEvent::Content {
            content: text.into(),
        }
    }

    pub fn done(model: impl Into<String>) -> Self {
        StreamEvent::Done {
            model: model.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }

    /// `data: <json>\n\n`
    pub fn to_sse_bytes(&self) -> Bytes {
        sse_json_bytes(self).unwrap_or_else(|| Bytes::from_static(b"data: {}\n\n"))
    }
}
