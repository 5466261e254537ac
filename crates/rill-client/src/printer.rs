// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::io::{self, Write};

use rill_core::{FlushOutcome, Segment};

/// Receives the segments of a response as they resolve.
pub trait SegmentSink {
    /// `segments[from..]` were created or changed.
    fn update(&mut self, segments: &[Segment], from: usize) -> io::Result<()>;

    /// The response ended; `segments` is its final content.
    fn finish(&mut self, segments: &[Segment], outcome: FlushOutcome) -> io::Result<()>;

    /// The response failed after `segments` had resolved.
    fn error(&mut self, segments: &[Segment], message: &str) -> io::Result<()>;
}

/// Writes responses as plain text: prose as it streams, code blocks as
/// fenced blocks once they are complete.
pub struct PlainPrinter<W, E> {
    out: W,
    err: E,
    /// Bytes of each segment already written.
    printed: Vec<usize>,
    at_line_start: bool,
}

impl PlainPrinter<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<W: Write, E: Write> PlainPrinter<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self { out, err, printed: Vec::new(), at_line_start: true }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn write_out(&mut self, s: &str) -> io::Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        self.out.write_all(s.as_bytes())?;
        self.at_line_start = s.ends_with('\n');
        Ok(())
    }

    fn render(&mut self, segments: &[Segment]) -> io::Result<()> {
        for (idx, segment) in segments.iter().enumerate() {
            let done = self.printed.get(idx).copied().unwrap_or(0);
            if idx >= self.printed.len() {
                self.printed.push(0);
            }
            match segment {
                Segment::Text { content } => {
                    // A trailing-whitespace trim shrinks what was printed.
                    if done < content.len() && content.is_char_boundary(done) {
                        self.write_out(&content[done..])?;
                    }
                    self.printed[idx] = self.printed[idx].max(content.len());
                }
                Segment::Code { language, content } if done == 0 => {
                    if !self.at_line_start {
                        self.write_out("\n")?;
                    }
                    let block = if content.is_empty() {
                        format!("```{language}\n```\n")
                    } else {
                        format!("```{language}\n{content}\n```\n")
                    };
                    self.write_out(&block)?;
                    self.printed[idx] = content.len().max(1);
                }
                Segment::Code { .. } => {}
            }
        }
        self.out.flush()
    }

    fn end_response(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            self.write_out("\n")?;
        }
        self.printed.clear();
        self.out.flush()
    }
}

impl<W: Write, E: Write> SegmentSink for PlainPrinter<W, E> {
    fn update(&mut self, segments: &[Segment], _from: usize) -> io::Result<()> {
        self.render(segments)
    }

    fn finish(&mut self, segments: &[Segment], outcome: FlushOutcome) -> io::Result<()> {
        self.render(segments)?;
        self.end_response()?;
        if outcome == FlushOutcome::UnterminatedFence {
            writeln!(self.err, "(response ended inside an unterminated code block)")?;
        }
        Ok(())
    }

    fn error(&mut self, segments: &[Segment], message: &str) -> io::Result<()> {
        self.render(segments)?;
        self.end_response()?;
        writeln!(self.err, "{message}")?;
        self.err.flush()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
