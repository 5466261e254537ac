// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Streaming chat core shared by the relay server and its clients.
//!
//! - [`protocol`] frames relay messages for the WebSocket, either as tagged
//!   JSON envelopes or as the legacy `END` / `ERROR` sentinel strings.
//! - [`reassembler`] rebuilds prose and fenced code blocks from arbitrarily
//!   split text fragments.
//! - [`session`] drives one client channel: it owns the reassembler and the
//!   [`conversation`] log and enforces one request in flight at a time.

pub mod conversation;
pub mod protocol;
pub mod reassembler;
pub mod segment;
pub mod session;

pub use conversation::{ConversationLog, Entry, Role};
pub use protocol::{decode, encode, ProtocolError, ServerMessage, ERROR_MARKER, TERMINAL_MARKER};
pub use reassembler::{FlushOutcome, Reassembler, DEFAULT_LANGUAGE, FENCE};
pub use rill_config::WireFormat;
pub use segment::Segment;
pub use session::{Session, SessionError, SessionEvent, ERROR_NOTICE};
