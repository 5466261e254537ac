// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Google Gemini driver for the native Generative Language API.
//!
//! Uses the `streamGenerateContent` endpoint in SSE mode.
//!
//! # Auth
//! API key via the `x-goog-api-key` header.  The key is kept out of the URL
//! so transport errors, which echo the URL, never carry it into logs.
//!
//! # Endpoint pattern
//! `POST https://generativelanguage.googleapis.com/v1beta/models/{model}:streamGenerateContent?alt=sse`

use std::collections::VecDeque;
use std::pin::Pin;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tracing::debug;

use crate::{provider::ResponseStream, CompletionRequest, ResponseEvent, Role};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GoogleProvider {
    model: String,
    api_key: Option<String>,
    base_url: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(
        model: String,
        api_key: Option<String>,
        base_url: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            max_tokens,
            temperature,
            client: reqwest::Client::new(),
        }
    }

    fn request_body(&self, req: &CompletionRequest) -> Value {
        let mut system_parts: Vec<Value> = Vec::new();
        let mut contents: Vec<Value> = Vec::new();

        for m in &req.messages {
            match m.role {
                Role::System => system_parts.push(json!({ "text": m.content })),
                Role::User => {
                    contents.push(json!({ "role": "user", "parts": [{ "text": m.content }] }))
                }
                Role::Assistant => {
                    contents.push(json!({ "role": "model", "parts": [{ "text": m.content }] }))
                }
            }
        }

        let mut body = json!({ "contents": contents });
        let mut generation = serde_json::Map::new();
        if let Some(max) = self.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(max));
        }
        if let Some(t) = self.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }
        if !system_parts.is_empty() {
            body["systemInstruction"] = json!({ "parts": system_parts });
        }
        body
    }
}

#[async_trait]
impl crate::ModelProvider for GoogleProvider {
    fn name(&self) -> &str { "google" }
    fn model_name(&self) -> &str { &self.model }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let key = self.api_key.as_deref().context("GEMINI_API_KEY not set")?;

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model,
        );

        debug!(model = %self.model, "sending Google Gemini request");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&self.request_body(&req))
            .send()
            .await
            .context("Google Gemini request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Google Gemini error {status}: {}", error_summary(&text));
        }

        Ok(sse_events(resp.bytes_stream()))
    }
}

/// Pull `error.message` out of a JSON error body; fall back to the raw text.
fn error_summary(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_owned))
        .unwrap_or_else(|| body.trim().to_string())
}

// ── SSE framing ───────────────────────────────────────────────────────────────

/// Accumulates raw body bytes and yields complete lines.
///
/// Network reads do not respect line boundaries, so a `data:` line may arrive
/// in several pieces; only newline-terminated lines are parsed.
#[derive(Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<anyhow::Result<ResponseEvent>> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            events.extend(parse_sse_line(&String::from_utf8_lossy(&line)));
        }
        events
    }

    /// Parse a final unterminated line, if any.
    fn finish(&mut self) -> Vec<anyhow::Result<ResponseEvent>> {
        let rest = std::mem::take(&mut self.pending);
        parse_sse_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_sse_line(line: &str) -> Vec<anyhow::Result<ResponseEvent>> {
    let Some(payload) = line.trim().strip_prefix("data:").map(str::trim) else {
        return Vec::new();
    };
    if payload.is_empty() {
        return Vec::new();
    }
    if payload == "[DONE]" {
        return vec![Ok(ResponseEvent::Done)];
    }
    match serde_json::from_str::<Value>(payload) {
        Ok(v) => match parse_gemini_chunk(&v) {
            Ok(events) => events.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        },
        Err(e) => vec![Err(anyhow!("malformed Gemini stream payload: {e}"))],
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    lines: SseLineBuffer,
    queued: VecDeque<anyhow::Result<ResponseEvent>>,
    finished: bool,
}

/// Turn a raw SSE body into a stream of [`ResponseEvent`]s.
///
/// The stream ends after the first error it yields.
fn sse_events<S, B, E>(body: S) -> ResponseStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        lines: SseLineBuffer::default(),
        queued: VecDeque::new(),
        finished: false,
    };
    let stream = futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(ev) = st.queued.pop_front() {
                if ev.is_err() {
                    st.queued.clear();
                    st.finished = true;
                }
                return Some((ev, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    let events = st.lines.push(bytes.as_ref());
                    st.queued.extend(events);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    st.queued.push_back(Err(anyhow!(e).context("reading Gemini stream")));
                }
                None => {
                    st.finished = true;
                    let events = st.lines.finish();
                    st.queued.extend(events);
                }
            }
        }
    });
    Box::pin(stream)
}

// ── Chunk parsing ─────────────────────────────────────────────────────────────

/// Convert one decoded SSE payload into zero or more events.
///
/// Text parts are concatenated (thought parts are skipped).  Usage metadata is
/// reported only on the final chunk, identified by `finishReason`.
fn parse_gemini_chunk(v: &Value) -> anyhow::Result<Vec<ResponseEvent>> {
    if let Some(err) = v.get("error") {
        let message = err["message"].as_str().unwrap_or("unknown error");
        bail!("Google Gemini stream error: {message}");
    }

    let mut events = Vec::new();
    let candidate = &v["candidates"][0];

    if let Some(parts) = candidate["content"]["parts"].as_array() {
        let text: String = parts
            .iter()
            .filter(|p| p.get("thought").and_then(Value::as_bool) != Some(true))
            .filter_map(|p| p["text"].as_str())
            .collect();
        if !text.is_empty() {
            events.push(ResponseEvent::TextDelta(text));
        }
    }

    if candidate["finishReason"].as_str().is_some() {
        if let Some(meta) = v.get("usageMetadata") {
            events.push(ResponseEvent::Usage {
                input_tokens: meta["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                output_tokens: meta["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
            });
        }
        events.push(ResponseEvent::Done);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, ModelProvider};

    #[test]
    fn provider_name() {
        let p = GoogleProvider::new("gemini-2.0-flash".into(), None, None, None, None);
        assert_eq!(p.name(), "google");
        assert_eq!(p.model_name(), "gemini-2.0-flash");
    }

    #[test]
    fn text_delta_parsed() {
        let v = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "hello" }]
                }
            }]
        });
        let ev = parse_gemini_chunk(&v).unwrap();
        assert_eq!(ev, vec![ResponseEvent::TextDelta("hello".into())]);
    }

    #[test]
    fn thought_parts_are_skipped() {
        let v = json!({
            "candidates": [{
                "content": {
                    "parts": [{ "text": "thinking...", "thought": true }, { "text": "answer" }]
                }
            }]
        });
        let ev = parse_gemini_chunk(&v).unwrap();
        assert_eq!(ev, vec![ResponseEvent::TextDelta("answer".into())]);
    }

    #[test]
    fn final_chunk_yields_text_usage_then_done() {
        let v = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "bye" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 100, "candidatesTokenCount": 50 }
        });
        let ev = parse_gemini_chunk(&v).unwrap();
        assert_eq!(
            ev,
            vec![
                ResponseEvent::TextDelta("bye".into()),
                ResponseEvent::Usage { input_tokens: 100, output_tokens: 50 },
                ResponseEvent::Done,
            ]
        );
    }

    #[test]
    fn intermediate_usage_metadata_is_ignored() {
        let v = json!({
            "candidates": [{ "content": { "parts": [{ "text": "a" }] } }],
            "usageMetadata": { "promptTokenCount": 1 }
        });
        assert_eq!(parse_gemini_chunk(&v).unwrap().len(), 1);
    }

    #[test]
    fn in_stream_error_object_fails() {
        let v = json!({ "error": { "code": 500, "message": "internal" } });
        let err = parse_gemini_chunk(&v).unwrap_err();
        assert!(err.to_string().contains("internal"));
    }

    #[test]
    fn line_split_across_reads_parses_once() {
        let mut buf = SseLineBuffer::default();
        let first = buf.push(br#"data: {"candidates":[{"content":{"par"#);
        assert!(first.is_empty());
        let second = buf.push(b"ts\":[{\"text\":\"hi\"}]}}]}\r\n\r\n");
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], Ok(ResponseEvent::TextDelta(t)) if t == "hi"));
    }

    #[test]
    fn unterminated_last_line_is_flushed() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: [DONE]").is_empty());
        let rest = buf.finish();
        assert!(matches!(rest.as_slice(), [Ok(ResponseEvent::Done)]));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert!(parse_sse_line(": keep-alive").is_empty());
        assert!(parse_sse_line("event: message").is_empty());
        assert!(parse_sse_line("").is_empty());
    }

    #[tokio::test]
    async fn sse_stream_ends_after_first_error() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n".to_vec()),
            Ok(b"data: not-json\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n".to_vec()),
        ];
        let mut stream = sse_events(futures::stream::iter(chunks));
        assert!(matches!(stream.next().await, Some(Ok(ResponseEvent::TextDelta(t))) if t == "a"));
        assert!(matches!(stream.next().await, Some(Err(_))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn request_body_maps_roles_and_generation_config() {
        let p = GoogleProvider::new("m".into(), None, None, Some(256), None);
        let body = p.request_body(&CompletionRequest {
            messages: vec![Message::system("sys"), Message::user("hi"), Message::assistant("yo")],
            stream: true,
        });
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let p = GoogleProvider::new("m".into(), None, Some("http://127.0.0.1:1".into()), None, None);
        let err = p.complete(CompletionRequest::prompt("hi")).await.err().unwrap();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }
}
