// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Incremental reconstruction of prose and fenced code blocks.
//!
//! Fragments arrive split at arbitrary points: mid-word, mid-line, even in the
//! middle of a fence delimiter.  The [`Reassembler`] appends each fragment to
//! a buffer, splits the buffer on [`FENCE`], and turns every part whose
//! boundaries are known into a [`Segment`]:
//!
//! ```text
//! "intro ```py\nx = 1\n``` outro"
//!    │        │             │
//!    part 0   part 1        part 2
//!    text     code          text (open: more prose may follow)
//! ```
//!
//! An even number of parts means the last fence is still open; that part
//! stays in the buffer, prefixed with the fence again, until its closing fence
//! arrives.  Text at the end of the buffer is emitted immediately so prose
//! streams, except for its trailing run of whitespace and backticks (possibly
//! the start of a split fence), which is held back.  The resolved segments
//! and the buffer then depend only on the text received so far, not on
//! where the fragments were split.

use tracing::debug;

use crate::Segment;

/// Code fence delimiter.
pub const FENCE: &str = "```";

/// Language assigned to a code fence that does not name one.
pub const DEFAULT_LANGUAGE: &str = "javascript";

/// What [`Reassembler::finalize`] found in the buffer at end of stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushOutcome {
    /// Every fence was closed.
    #[default]
    Clean,
    /// The stream ended inside a code fence; its contents were emitted as a
    /// best-effort code segment.
    UnterminatedFence,
}

#[derive(Debug, Clone)]
pub struct Reassembler {
    buffer: String,
    segments: Vec<Segment>,
    default_language: String,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Reassembler {
    pub fn new() -> Self {
        Self::with_default_language(DEFAULT_LANGUAGE)
    }

    pub fn with_default_language(language: impl Into<String>) -> Self {
        Self {
            buffer: String::new(),
            segments: Vec::new(),
            default_language: language.into(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Text received but not yet turned into segments.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    /// Move the resolved segments out, leaving the buffer untouched.
    pub fn take_segments(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.segments)
    }

    /// Drop unresolved buffered text.
    pub fn discard_pending(&mut self) {
        if !self.buffer.is_empty() {
            debug!(bytes = self.buffer.len(), "discarding unresolved fragment text");
            self.buffer.clear();
        }
    }

    /// Append `fragment` and resolve whatever the buffer now allows.
    ///
    /// Returns the index of the first segment that was created or modified,
    /// or `None` when no segment changed.
    pub fn ingest(&mut self, fragment: &str) -> Option<usize> {
        self.buffer.push_str(fragment);
        let buffer = std::mem::take(&mut self.buffer);
        let parts: Vec<&str> = buffer.split(FENCE).collect();

        let open_fence = parts.len() % 2 == 0;
        let processable = if open_fence { parts.len() - 1 } else { parts.len() };
        let mut dirty = Dirty::default();

        for (i, part) in parts[..processable].iter().enumerate() {
            if i % 2 == 1 {
                dirty.mark(self.push_code(part));
            } else if !open_fence && i == processable - 1 {
                let (emit, hold) = split_open_text(part);
                dirty.mark(self.push_text(emit));
                self.buffer.push_str(hold);
            } else {
                dirty.mark(self.push_text(part));
                dirty.mark(self.close_text());
            }
        }

        if open_fence {
            self.buffer.push_str(FENCE);
            self.buffer.push_str(parts[processable]);
        }

        dirty.0
    }

    /// Flush everything still buffered at end of stream.
    ///
    /// Held-back text is emitted (whitespace-only tails are dropped).  A fence
    /// that never closed is emitted as a code segment, parsed the same way a
    /// closed one would be, and reported as [`FlushOutcome::UnterminatedFence`].
    pub fn finalize(&mut self) -> FlushOutcome {
        let pending = std::mem::take(&mut self.buffer);
        let outcome = match pending.strip_prefix(FENCE) {
            Some(open) => {
                debug!(bytes = open.len(), "stream ended inside a code fence");
                if !open.trim().is_empty() {
                    self.push_code(open);
                }
                FlushOutcome::UnterminatedFence
            }
            None => {
                self.push_text(&pending);
                FlushOutcome::Clean
            }
        };
        self.close_text();
        outcome
    }

    /// Merge `text` into the trailing text segment or start a new one.
    fn push_text(&mut self, text: &str) -> Option<usize> {
        if text.trim().is_empty() {
            return None;
        }
        match self.segments.last_mut() {
            Some(Segment::Text { content }) => content.push_str(text),
            _ => self.segments.push(Segment::text(text.trim_start())),
        }
        Some(self.segments.len() - 1)
    }

    /// A fence follows the trailing text segment: nothing more can be appended
    /// to it, so its trailing whitespace goes.
    fn close_text(&mut self) -> Option<usize> {
        let idx = self.segments.len().checked_sub(1)?;
        let Segment::Text { content } = &mut self.segments[idx] else {
            return None;
        };
        let trimmed = content.trim_end().len();
        if trimmed == content.len() {
            return None;
        }
        content.truncate(trimmed);
        Some(idx)
    }

    /// First line is the language tag, the rest is the code.
    fn push_code(&mut self, part: &str) -> Option<usize> {
        let (first, rest) = part.split_once('\n').unwrap_or((part, ""));
        let language = match first.trim() {
            "" => self.default_language.clone(),
            tag => tag.to_string(),
        };
        self.segments.push(Segment::code(language, rest.trim()));
        Some(self.segments.len() - 1)
    }
}

/// Split the trailing, still-open text part into what can be emitted now and
/// what must wait for the next fragment.
fn split_open_text(part: &str) -> (&str, &str) {
    let body_len = part.trim_end_matches(|c: char| c == '`' || c.is_whitespace()).len();
    part.split_at(body_len)
}

/// Lowest segment index touched during one pass.
#[derive(Default)]
struct Dirty(Option<usize>);

impl Dirty {
    fn mark(&mut self, idx: Option<usize>) {
        if let Some(i) = idx {
            self.0 = Some(self.0.map_or(i, |cur| cur.min(i)));
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
