// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol between the relay and its clients.
//!
//! # Typical request flow
//!
//! ```text
//! Client                              Relay
//!    │                                   │
//!    │── "prompt text" (raw frame) ─────►│  upstream call starts
//!    │◄─ chunk "Sure, here" ─────────────│
//!    │◄─ chunk "'s code:\n```py" ────────│  ... one frame per fragment ...
//!    │◄─ end ────────────────────────────│  (or exactly one error)
//!    │                                   │
//!    │── "next prompt" ─────────────────►│  channel is reused
//! ```
//!
//! Client → relay frames are always the raw prompt text.  Relay → client
//! frames depend on the [`WireFormat`]:
//!
//! - **Envelope**: `{"kind":"chunk","payload":"..."}`, `{"kind":"end"}`,
//!   `{"kind":"error","payload":"..."}`.
//! - **Sentinel**: the fragment text itself, then a bare `END` or `ERROR`.
//!   A fragment whose text equals a marker cannot be represented and is
//!   refused at encode time.
//!
//! ```rust
//! # use rill_core::{decode, encode, ServerMessage, WireFormat};
//! let msg = ServerMessage::chunk("hello");
//! let frame = encode(WireFormat::Envelope, &msg).unwrap();
//! assert_eq!(frame, r#"{"kind":"chunk","payload":"hello"}"#);
//! assert_eq!(decode(WireFormat::Envelope, &frame).unwrap(), msg);
//! ```

use rill_config::WireFormat;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Legacy terminal marker sent after the last fragment of a response.
pub const TERMINAL_MARKER: &str = "END";
/// Legacy marker sent instead of [`TERMINAL_MARKER`] when generation fails.
pub const ERROR_MARKER: &str = "ERROR";

/// One relay → client event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A fragment of generated text, forwarded verbatim.
    Chunk { payload: String },
    /// The response completed normally.
    End,
    /// The response failed; no further chunks follow for this request.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
}

impl ServerMessage {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { payload: text.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { payload: Some(message.into()) }
    }

    /// `true` for `End` and `Error`, the two messages that close a request.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chunk { .. } => "chunk",
            Self::End => "end",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] serde_json::Error),

    #[error("fragment {0:?} collides with a sentinel marker")]
    SentinelCollision(String),
}

/// Frame `msg` as a WebSocket text payload.
pub fn encode(format: WireFormat, msg: &ServerMessage) -> Result<String, ProtocolError> {
    match format {
        WireFormat::Envelope => Ok(serde_json::to_string(msg)?),
        WireFormat::Sentinel => match msg {
            ServerMessage::Chunk { payload } => {
                if payload == TERMINAL_MARKER || payload == ERROR_MARKER {
                    Err(ProtocolError::SentinelCollision(payload.clone()))
                } else {
                    Ok(payload.clone())
                }
            }
            ServerMessage::End => Ok(TERMINAL_MARKER.to_string()),
            ServerMessage::Error { .. } => Ok(ERROR_MARKER.to_string()),
        },
    }
}

/// Parse a WebSocket text payload received from the relay.
pub fn decode(format: WireFormat, frame: &str) -> Result<ServerMessage, ProtocolError> {
    match format {
        WireFormat::Envelope => Ok(serde_json::from_str(frame)?),
        WireFormat::Sentinel => Ok(match frame {
            TERMINAL_MARKER => ServerMessage::End,
            ERROR_MARKER => ServerMessage::Error { payload: None },
            other => ServerMessage::chunk(other),
        }),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_shapes_are_stable() {
        let end = encode(WireFormat::Envelope, &ServerMessage::End).unwrap();
        assert_eq!(end, r#"{"kind":"end"}"#);
        let err = encode(WireFormat::Envelope, &ServerMessage::error("boom")).unwrap();
        assert_eq!(err, r#"{"kind":"error","payload":"boom"}"#);
        let bare = encode(WireFormat::Envelope, &ServerMessage::Error { payload: None }).unwrap();
        assert_eq!(bare, r#"{"kind":"error"}"#);
    }

    #[test]
    fn envelope_chunk_may_carry_marker_text() {
        let frame = encode(WireFormat::Envelope, &ServerMessage::chunk("END")).unwrap();
        assert_eq!(decode(WireFormat::Envelope, &frame).unwrap(), ServerMessage::chunk("END"));
    }

    #[test]
    fn envelope_rejects_garbage_and_unknown_kinds() {
        assert!(decode(WireFormat::Envelope, "END").is_err());
        assert!(decode(WireFormat::Envelope, r#"{"kind":"progress"}"#).is_err());
        assert!(decode(WireFormat::Envelope, r#"{"kind":"chunk"}"#).is_err());
    }

    #[test]
    fn sentinel_markers_decode_to_control_messages() {
        assert_eq!(decode(WireFormat::Sentinel, "END").unwrap(), ServerMessage::End);
        assert_eq!(
            decode(WireFormat::Sentinel, "ERROR").unwrap(),
            ServerMessage::Error { payload: None }
        );
        assert_eq!(
            decode(WireFormat::Sentinel, "END of story").unwrap(),
            ServerMessage::chunk("END of story")
        );
    }

    #[test]
    fn sentinel_refuses_colliding_fragment() {
        let err = encode(WireFormat::Sentinel, &ServerMessage::chunk("END")).unwrap_err();
        assert!(matches!(err, ProtocolError::SentinelCollision(t) if t == "END"));
        assert!(encode(WireFormat::Sentinel, &ServerMessage::chunk("ERROR")).is_err());
    }

    #[test]
    fn sentinel_error_drops_payload() {
        let frame = encode(WireFormat::Sentinel, &ServerMessage::error("why")).unwrap();
        assert_eq!(frame, "ERROR");
    }

    #[test]
    fn terminal_classification() {
        assert!(!ServerMessage::chunk("x").is_terminal());
        assert!(ServerMessage::End.is_terminal());
        assert!(ServerMessage::error("x").is_terminal());
    }
}
