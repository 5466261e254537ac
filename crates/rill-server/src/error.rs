// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use rill_core::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server error: {0}")]
    Http(#[from] std::io::Error),

    #[error("outbound queue closed")]
    ChannelClosed,

    #[error("outbound queue full")]
    Overflow,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
