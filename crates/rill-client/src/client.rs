// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use anyhow::{bail, Context, Result};
use futures::{SinkExt, StreamExt};
use rill_config::WireFormat;
use rill_core::{decode, Session, SessionEvent};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

use crate::SegmentSink;

/// A channel to the relay.  Requests are strictly sequential: each `ask`
/// waits for the terminal message before returning.
pub struct RelayClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    format: WireFormat,
    session: Session,
}

impl RelayClient {
    pub async fn connect(url: &str, format: WireFormat, default_language: &str) -> Result<Self> {
        let request = url.into_client_request().context("invalid WebSocket URL")?;
        let (ws, response) = connect_async(request)
            .await
            .with_context(|| format!("WebSocket connect to {url} failed"))?;
        debug!(status = %response.status(), url, "connected to relay");
        Ok(Self { ws, format, session: Session::with_default_language(default_language) })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Send `prompt` and feed the streamed response into `sink`.
    ///
    /// Returns the terminal event.  A channel that closes before the
    /// terminal message arrives is an error: the response is truncated.
    /// On any error the session is reset to idle.
    pub async fn ask(&mut self, prompt: &str, sink: &mut impl SegmentSink) -> Result<SessionEvent> {
        let frame = self.session.begin(prompt)?;
        let result = self.exchange(frame, sink).await;
        if result.is_err() {
            self.session.abort();
        }
        result
    }

    async fn exchange(&mut self, frame: String, sink: &mut impl SegmentSink) -> Result<SessionEvent> {
        self.ws.send(Message::Text(frame)).await.context("failed to send prompt")?;

        while let Some(msg) = self.ws.next().await {
            let text = match msg.context("WebSocket read error")? {
                Message::Text(t) => t,
                Message::Close(_) => break,
                _ => continue,
            };
            let msg = match decode(self.format, &text) {
                Ok(m) => m,
                Err(e) => {
                    warn!("unparseable frame from relay: {e}");
                    continue;
                }
            };
            let event = self.session.handle(msg)?;
            match &event {
                SessionEvent::Updated { from: Some(from) } => {
                    sink.update(self.session.pending(), *from)?;
                }
                SessionEvent::Updated { from: None } => {}
                SessionEvent::Completed(outcome) => {
                    sink.finish(self.session.pending(), *outcome)?;
                    return Ok(event);
                }
                SessionEvent::Failed { message } => {
                    sink.error(self.session.pending(), message)?;
                    return Ok(event);
                }
            }
        }

        bail!("relay closed the channel before the response completed")
    }

    /// Submit `prompts` one at a time, each after the previous response
    /// finished.
    pub async fn run_queue<I>(&mut self, prompts: I, sink: &mut impl SegmentSink) -> Result<Vec<SessionEvent>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut events = Vec::new();
        for prompt in prompts {
            events.push(self.ask(prompt.as_ref(), sink).await?);
        }
        Ok(events)
    }

    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await.context("failed to close channel")?;
        Ok(())
    }
}
