// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Client-side state for one channel.
//!
//! A [`Session`] is either idle or streaming a single response.  `&mut self`
//! serialises everything: fragments of one response are applied in arrival
//! order and a new prompt cannot start until the previous response reached a
//! terminal marker.

use thiserror::Error;
use tracing::debug;

use crate::{ConversationLog, FlushOutcome, Reassembler, Segment, ServerMessage, DEFAULT_LANGUAGE};

/// Shown in the conversation when the relay reports a failed response.
pub const ERROR_NOTICE: &str = "An error occurred. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Streaming,
}

/// What a handled message changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Segments from index `from` onwards were created or changed.  `None`
    /// when the fragment is still buffered.
    Updated { from: Option<usize> },
    /// The response ended; its segments are now in the log.
    Completed(FlushOutcome),
    /// The response failed; `message` was appended to the log.
    Failed { message: String },
}

impl SessionEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a request is already in flight")]
    Busy,

    #[error("unexpected {0} message: no request in flight")]
    Unexpected(&'static str),
}

#[derive(Debug)]
pub struct Session {
    state: State,
    reassembler: Reassembler,
    log: ConversationLog,
    default_language: String,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_default_language(DEFAULT_LANGUAGE)
    }

    pub fn with_default_language(language: impl Into<String>) -> Self {
        let default_language = language.into();
        Self {
            state: State::Idle,
            reassembler: Reassembler::with_default_language(default_language.clone()),
            log: ConversationLog::new(),
            default_language,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state == State::Streaming
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    /// Segments of the response in flight, or of the most recent response
    /// until the next [`begin`](Self::begin).
    pub fn pending(&self) -> &[Segment] {
        self.reassembler.segments()
    }

    /// Start a request.  Records the prompt and returns the frame to send.
    pub fn begin(&mut self, prompt: impl Into<String>) -> Result<String, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let prompt = prompt.into();
        self.reassembler = Reassembler::with_default_language(self.default_language.clone());
        self.log.push_user(prompt.clone());
        self.state = State::Streaming;
        Ok(prompt)
    }

    pub fn handle(&mut self, msg: ServerMessage) -> Result<SessionEvent, SessionError> {
        if !self.is_busy() {
            return Err(SessionError::Unexpected(msg.kind()));
        }
        match msg {
            ServerMessage::Chunk { payload } => {
                let from = self.reassembler.ingest(&payload);
                Ok(SessionEvent::Updated { from })
            }
            ServerMessage::End => {
                let outcome = self.reassembler.finalize();
                self.commit();
                debug!(?outcome, segments = self.pending().len(), "response complete");
                Ok(SessionEvent::Completed(outcome))
            }
            ServerMessage::Error { payload } => {
                self.reassembler.discard_pending();
                self.reassembler.finalize();
                self.commit();
                let message = match payload {
                    Some(detail) if !detail.is_empty() => format!("{ERROR_NOTICE} ({detail})"),
                    _ => ERROR_NOTICE.to_string(),
                };
                self.log.push_error(message.clone());
                Ok(SessionEvent::Failed { message })
            }
        }
    }

    /// Give up on the response in flight without a terminal message.
    ///
    /// Resolved segments are committed, the unresolved buffer is dropped.
    pub fn abort(&mut self) {
        if !self.is_busy() {
            return;
        }
        debug!(segments = self.pending().len(), "response aborted");
        self.reassembler.discard_pending();
        self.reassembler.finalize();
        self.commit();
    }

    fn commit(&mut self) {
        self.log.push_bot_many(self.reassembler.segments().iter().cloned());
        self.state = State::Idle;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
