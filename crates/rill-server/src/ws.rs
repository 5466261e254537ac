// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! WebSocket channel handler.
//!
//! Each accepted socket becomes one channel served by three cooperating
//! parts:
//!
//! - the **read loop** (this task) turns every text frame into a prompt and
//!   pushes it onto the channel's request queue;
//! - the **relay task** takes prompts off that queue one at a time and
//!   streams each response into the outbound queue, so a second prompt waits
//!   for the first response's terminal message instead of interleaving;
//! - the **writer task** drains the bounded outbound queue into the socket.
//!
//! When the peer goes away the channel's cancellation token fires: the
//! upstream stream in flight is dropped and queued prompts are discarded.

use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    relay::{relay_prompt, Outbound, RelayOutcome},
    AppState,
};

/// HTTP handler for `GET /` and `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

pub async fn handle_socket(socket: WebSocket, state: AppState, peer: SocketAddr) {
    info!(%peer, "channel opened");
    let (mut sink, mut frames) = socket.split();
    let cancel = CancellationToken::new();

    let (out_tx, mut out_rx) = mpsc::channel::<String>(state.config.outbound_queue.max(1));
    let outbound = Outbound::new(
        out_tx,
        state.config.wire_format,
        state.config.overflow,
        cancel.clone(),
    );

    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = out_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        debug!(%peer, "WebSocket send error: {e}");
                        writer_cancel.cancel();
                        break;
                    }
                }
                _ = writer_cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel::<String>();
    let relay_cancel = cancel.clone();
    let provider = state.provider.clone();
    let relay = tokio::spawn(async move {
        let mut requests = 0usize;
        loop {
            let prompt = tokio::select! {
                biased;
                _ = relay_cancel.cancelled() => break,
                prompt = prompt_rx.recv() => match prompt {
                    Some(p) => p,
                    None => break,
                },
            };
            requests += 1;
            let outcome = relay_prompt(provider.as_ref(), prompt, &outbound, &relay_cancel).await;
            debug!(%peer, request = requests, ?outcome, "request finished");
            if outcome == RelayOutcome::Cancelled {
                break;
            }
        }
        requests
    });

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(Message::Text(prompt))) => {
                log_prompt(&prompt, peer);
                if prompt_tx.send(prompt).is_err() {
                    break;
                }
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {} // binary, ping and pong frames ignored
            Some(Err(e)) => {
                debug!(%peer, "WebSocket recv error: {e}");
                break;
            }
        }
    }

    cancel.cancel();
    drop(prompt_tx);
    let requests = relay.await.unwrap_or_default();
    let _ = writer.await;
    info!(%peer, requests, "channel closed");
}

/// Prompts are truncated in the log.
fn log_prompt(prompt: &str, peer: SocketAddr) {
    let preview: String = prompt.chars().take(80).collect();
    let truncated = if prompt.chars().count() > 80 { "…" } else { "" };
    info!(%peer, prompt = ?format!("{preview}{truncated}"), "prompt received");
}
