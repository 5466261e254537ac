// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

// ─── Message types ────────────────────────────────────────────────────────────

/// A single message in the prompt sent upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: text.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Request sent to a model provider.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl CompletionRequest {
    /// A streamed request whose only content is `prompt`.
    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(prompt)], stream: true }
    }

    /// Text of the last user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A single streamed event from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    /// A text delta streamed from the model
    TextDelta(String),
    /// Final usage statistics
    Usage {
        input_tokens: u32,
        output_tokens: u32,
    },
    /// The stream finished normally
    Done,
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_request_is_single_streamed_user_message() {
        let req = CompletionRequest::prompt("hello");
        assert!(req.stream);
        assert_eq!(req.messages, vec![Message::user("hello")]);
    }

    #[test]
    fn last_user_text_skips_assistant_turns() {
        let req = CompletionRequest {
            messages: vec![
                Message::system("be brief"),
                Message::user("first"),
                Message::assistant("reply"),
            ],
            stream: true,
        };
        assert_eq!(req.last_user_text(), Some("first"));
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::user("x")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"x"}"#);
    }
}
