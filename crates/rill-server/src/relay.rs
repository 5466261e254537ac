// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Forwarding of one upstream response to one channel.
//!
//! Every request ends with exactly one terminal message: `End` when the
//! upstream stream finishes, `Error` on the first failure.  Nothing is sent
//! after a cancelled request.

use futures::StreamExt;
use rill_config::{OverflowPolicy, WireFormat};
use rill_core::{encode, ServerMessage};
use rill_model::{CompletionRequest, ModelProvider, ResponseEvent};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::RelayError;

/// Error payload reported to clients.  Upstream details stay in the log.
pub const UPSTREAM_FAILED: &str = "upstream generation failed";

/// How a relayed request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Completed { fragments: usize },
    Failed,
    Cancelled,
}

/// Sending half of a channel's bounded outbound queue.
///
/// Messages are framed for the channel's wire format before they are queued,
/// so a fragment the format cannot carry is refused here rather than in the
/// writer.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
    format: WireFormat,
    policy: OverflowPolicy,
    cancel: CancellationToken,
}

impl Outbound {
    pub fn new(
        tx: mpsc::Sender<String>,
        format: WireFormat,
        policy: OverflowPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self { tx, format, policy, cancel }
    }

    pub async fn send(&self, msg: &ServerMessage) -> Result<(), RelayError> {
        let frame = encode(self.format, msg)?;
        match self.policy {
            OverflowPolicy::Wait => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(RelayError::ChannelClosed),
                sent = self.tx.send(frame) => sent.map_err(|_| RelayError::ChannelClosed),
            },
            OverflowPolicy::Disconnect => match self.tx.try_send(frame) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    warn!(capacity = self.tx.max_capacity(), "outbound queue full, closing channel");
                    self.cancel.cancel();
                    Err(RelayError::Overflow)
                }
                Err(TrySendError::Closed(_)) => Err(RelayError::ChannelClosed),
            },
        }
    }
}

/// Stream the response to `prompt` from `provider` into `out`.
///
/// Each non-empty text delta is queued as soon as it arrives.  The upstream
/// stream is dropped as soon as `cancel` fires.
pub async fn relay_prompt(
    provider: &dyn ModelProvider,
    prompt: String,
    out: &Outbound,
    cancel: &CancellationToken,
) -> RelayOutcome {
    let opened = tokio::select! {
        biased;
        _ = cancel.cancelled() => return RelayOutcome::Cancelled,
        opened = provider.complete(CompletionRequest::prompt(prompt)) => opened,
    };
    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            warn!(provider = provider.name(), "upstream request failed: {e:#}");
            return fail(out).await;
        }
    };

    let mut fragments = 0usize;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(fragments, "request cancelled mid-stream");
                return RelayOutcome::Cancelled;
            }
            next = stream.next() => next,
        };
        match next {
            Some(Ok(ResponseEvent::TextDelta(text))) => {
                if text.is_empty() {
                    continue;
                }
                match out.send(&ServerMessage::chunk(text)).await {
                    Ok(()) => fragments += 1,
                    Err(RelayError::Protocol(e)) => {
                        warn!(fragments, "cannot frame fragment: {e}");
                        return fail(out).await;
                    }
                    Err(e) => {
                        debug!(fragments, "dropping request: {e}");
                        return RelayOutcome::Cancelled;
                    }
                }
            }
            Some(Ok(ResponseEvent::Usage { input_tokens, output_tokens })) => {
                debug!(input_tokens, output_tokens, "token usage");
            }
            Some(Ok(ResponseEvent::Done)) | None => break,
            Some(Err(e)) => {
                warn!(provider = provider.name(), fragments, "upstream stream failed: {e:#}");
                return fail(out).await;
            }
        }
    }

    match out.send(&ServerMessage::End).await {
        Ok(()) => RelayOutcome::Completed { fragments },
        Err(_) => RelayOutcome::Cancelled,
    }
}

async fn fail(out: &Outbound) -> RelayOutcome {
    match out.send(&ServerMessage::error(UPSTREAM_FAILED)).await {
        Ok(()) => RelayOutcome::Failed,
        Err(_) => RelayOutcome::Cancelled,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rill_core::decode;
    use rill_model::{Script, ScriptedMockProvider};

    use super::*;

    fn outbound(
        format: WireFormat,
        policy: OverflowPolicy,
        capacity: usize,
    ) -> (Outbound, mpsc::Receiver<String>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        (Outbound::new(tx, format, policy, cancel.clone()), rx, cancel)
    }

    fn drain(format: WireFormat, rx: &mut mpsc::Receiver<String>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(decode(format, &frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn fragments_then_exactly_one_end() {
        let provider = ScriptedMockProvider::new(vec![Script::fragments(["a", "", "b"])]);
        let (out, mut rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Wait, 16);
        let outcome = relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(outcome, RelayOutcome::Completed { fragments: 2 });
        assert_eq!(
            drain(WireFormat::Envelope, &mut rx),
            vec![ServerMessage::chunk("a"), ServerMessage::chunk("b"), ServerMessage::End]
        );
    }

    #[tokio::test]
    async fn stream_without_done_still_ends() {
        let script = Script {
            events: vec![ResponseEvent::TextDelta("only".into())],
            ..Default::default()
        };
        let provider = ScriptedMockProvider::new(vec![script]);
        let (out, mut rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Wait, 16);
        relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(drain(WireFormat::Envelope, &mut rx).last(), Some(&ServerMessage::End));
    }

    #[tokio::test]
    async fn mid_stream_failure_sends_one_error() {
        let provider =
            ScriptedMockProvider::new(vec![Script::failing_after(["one", "two"], "quota exceeded")]);
        let (out, mut rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Wait, 16);
        let outcome = relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(outcome, RelayOutcome::Failed);
        let msgs = drain(WireFormat::Envelope, &mut rx);
        assert_eq!(
            msgs,
            vec![
                ServerMessage::chunk("one"),
                ServerMessage::chunk("two"),
                ServerMessage::error(UPSTREAM_FAILED),
            ]
        );
    }

    #[tokio::test]
    async fn refused_request_sends_one_error() {
        let provider = ScriptedMockProvider::new(vec![Script::refused("no API key")]);
        let (out, mut rx, cancel) = outbound(WireFormat::Sentinel, OverflowPolicy::Wait, 16);
        assert_eq!(relay_prompt(&provider, "p".into(), &out, &cancel).await, RelayOutcome::Failed);
        assert_eq!(rx.try_recv().unwrap(), "ERROR");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn sentinel_collision_becomes_error() {
        let provider = ScriptedMockProvider::new(vec![Script::fragments(["ok", "END", "more"])]);
        let (out, mut rx, cancel) = outbound(WireFormat::Sentinel, OverflowPolicy::Wait, 16);
        assert_eq!(relay_prompt(&provider, "p".into(), &out, &cancel).await, RelayOutcome::Failed);
        let frames: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(frames, vec!["ok".to_string(), "ERROR".to_string()]);
    }

    #[tokio::test]
    async fn cancellation_drops_upstream_without_terminal_message() {
        let provider = ScriptedMockProvider::new(vec![
            Script::fragments(vec!["x"; 50]).with_delay(Duration::from_millis(20))
        ]);
        let (out, mut rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Wait, 64);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(70)).await;
            trigger.cancel();
        });
        let outcome = relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert_eq!(provider.dropped_streams(), 1);
        let msgs = drain(WireFormat::Envelope, &mut rx);
        assert!(msgs.len() < 50);
        assert!(msgs.iter().all(|m| !m.is_terminal()));
    }

    #[tokio::test]
    async fn full_queue_with_disconnect_policy_cancels_channel() {
        let provider = ScriptedMockProvider::new(vec![Script::fragments(["a", "b", "c", "d"])]);
        let (out, _rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Disconnect, 2);
        let outcome = relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(outcome, RelayOutcome::Cancelled);
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn full_queue_with_wait_policy_applies_backpressure() {
        let provider = ScriptedMockProvider::new(vec![Script::fragments(["a", "b", "c", "d"])]);
        let (out, mut rx, cancel) = outbound(WireFormat::Envelope, OverflowPolicy::Wait, 1);
        let reader = tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(frame) = rx.recv().await {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let msg = decode(WireFormat::Envelope, &frame).unwrap();
                let done = msg.is_terminal();
                got.push(msg);
                if done {
                    break;
                }
            }
            got
        });
        let outcome = relay_prompt(&provider, "p".into(), &out, &cancel).await;
        assert_eq!(outcome, RelayOutcome::Completed { fragments: 4 });
        assert_eq!(reader.await.unwrap().len(), 5);
    }
}
