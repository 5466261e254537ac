// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::{stream, StreamExt};

use crate::{provider::ResponseStream, CompletionRequest, ResponseEvent};

/// Deterministic mock provider for tests.  Echoes the last user message
/// back as the assistant response.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        let reply = req.last_user_text().unwrap_or("[no input]").to_string();

        let events: Vec<anyhow::Result<ResponseEvent>> = vec![
            Ok(ResponseEvent::TextDelta(format!("MOCK: {reply}"))),
            Ok(ResponseEvent::Usage { input_tokens: 10, output_tokens: 10 }),
            Ok(ResponseEvent::Done),
        ];
        Ok(Box::pin(stream::iter(events)))
    }
}

/// One scripted upstream response.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Events emitted in order.
    pub events: Vec<ResponseEvent>,
    /// Error emitted after all `events`, ending the stream.
    pub fail_with: Option<String>,
    /// Error returned from `complete` itself; no stream is produced.
    pub fail_on_open: Option<String>,
    /// Pause before each emitted item.
    pub delay: Option<Duration>,
}

impl Script {
    /// Text fragments followed by `Done`.
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<ResponseEvent> =
            fragments.into_iter().map(|f| ResponseEvent::TextDelta(f.into())).collect();
        events.push(ResponseEvent::Done);
        Self { events, ..Default::default() }
    }

    /// Text fragments followed by a mid-stream failure.
    pub fn failing_after<I, S>(fragments: I, error: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: fragments.into_iter().map(|f| ResponseEvent::TextDelta(f.into())).collect(),
            fail_with: Some(error.into()),
            ..Default::default()
        }
    }

    /// A request the provider refuses outright.
    pub fn refused(error: impl Into<String>) -> Self {
        Self { fail_on_open: Some(error.into()), ..Default::default() }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Counts streams that were dropped, whether drained or abandoned.
struct DropProbe(Arc<AtomicUsize>);

impl Drop for DropProbe {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response script from the front of the queue.  This lets tests specify
/// exact fragment sequences, failures and pacing without network access.
pub struct ScriptedMockProvider {
    scripts: Arc<Mutex<Vec<Script>>>,
    /// Every request seen by this provider, in call order.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
    dropped: Arc<AtomicUsize>,
}

impl ScriptedMockProvider {
    /// Build a provider from a list of response scripts, one per call.
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            requests: Arc::new(Mutex::new(Vec::new())),
            dropped: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of response streams that have been dropped so far.
    pub fn dropped_streams(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.last_user_text().map(str::to_owned))
            .collect()
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<ResponseStream> {
        self.requests.lock().unwrap().push(req);
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                // Default fallback when all scripts are consumed
                Script::fragments(["[no more scripts]"])
            } else {
                scripts.remove(0)
            }
        };

        if let Some(err) = script.fail_on_open {
            return Err(anyhow!(err));
        }

        let mut items: Vec<anyhow::Result<ResponseEvent>> =
            script.events.into_iter().map(Ok).collect();
        if let Some(err) = script.fail_with {
            items.push(Err(anyhow!(err)));
        }

        let probe = DropProbe(self.dropped.clone());
        let delay = script.delay;
        let stream = stream::iter(items).then(move |item| {
            // The probe lives as long as the stream does.
            let _alive = &probe;
            async move {
                if let Some(d) = delay {
                    tokio::time::sleep(d).await;
                }
                item
            }
        });
        Ok(Box::pin(stream))
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
