// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use crate::Segment;

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Bot,
    /// A notice generated locally when a response failed.
    AppError,
}

/// One entry in the conversation display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub role: Role,
    pub segment: Segment,
}

/// Append-only record of a channel's conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    entries: Vec<Entry>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, prompt: impl Into<String>) {
        self.entries.push(Entry { role: Role::User, segment: Segment::text(prompt) });
    }

    /// Append a bot segment.  Text following a bot text entry is merged into
    /// it; everything else starts a new entry.
    pub fn push_bot(&mut self, segment: Segment) {
        if let Segment::Text { content } = &segment {
            if let Some(Entry { role: Role::Bot, segment: Segment::Text { content: last } }) =
                self.entries.last_mut()
            {
                last.push_str(content);
                return;
            }
        }
        self.entries.push(Entry { role: Role::Bot, segment });
    }

    pub fn push_bot_many(&mut self, segments: impl IntoIterator<Item = Segment>) {
        for s in segments {
            self.push_bot(s);
        }
    }

    pub fn push_error(&mut self, notice: impl Into<String>) {
        self.entries.push(Entry { role: Role::AppError, segment: Segment::text(notice) });
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_text_merges_only_into_bot_text() {
        let mut log = ConversationLog::new();
        log.push_user("hi");
        log.push_bot(Segment::text("Hel"));
        log.push_bot(Segment::text("lo"));
        log.push_bot(Segment::code("rust", "x"));
        log.push_bot(Segment::text("after"));
        assert_eq!(log.len(), 4);
        assert_eq!(log.entries()[1].segment, Segment::text("Hello"));
        assert_eq!(log.entries()[3].segment, Segment::text("after"));
    }

    #[test]
    fn user_text_is_never_merged_into() {
        let mut log = ConversationLog::new();
        log.push_user("question");
        log.push_bot(Segment::text("answer"));
        log.push_user("again");
        log.push_bot(Segment::text("second"));
        let roles: Vec<Role> = log.entries().iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Bot, Role::User, Role::Bot]);
    }

    #[test]
    fn error_notice_breaks_merging() {
        let mut log = ConversationLog::new();
        log.push_bot(Segment::text("partial"));
        log.push_error("An error occurred. Please try again.");
        log.push_bot(Segment::text("next"));
        assert_eq!(log.len(), 3);
        assert_eq!(log.entries()[1].role, Role::AppError);
    }
}
