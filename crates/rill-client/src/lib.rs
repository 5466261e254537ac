// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod client;
mod printer;

pub use client::RelayClient;
pub use printer::{PlainPrinter, SegmentSink};
