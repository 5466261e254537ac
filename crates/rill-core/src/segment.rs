// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// A finalized unit of response content, ready for a renderer.
///
/// Serialises as `{"type":"text","content":..}` or
/// `{"type":"code","language":..,"content":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    /// Prose, rendered as markdown.
    Text { content: String },
    /// A fenced code block.
    Code { language: String, content: String },
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text { content: content.into() }
    }

    pub fn code(language: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Code { language: language.into(), content: content.into() }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Text { content } | Self::Code { content, .. } => content,
        }
    }

    /// Language tag for code segments.
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::Code { language, .. } => Some(language),
            Self::Text { .. } => None,
        }
    }
}
