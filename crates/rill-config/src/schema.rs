// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

// ── Wire protocol selection ───────────────────────────────────────────────────

/// How relay messages are framed on the WebSocket.
///
/// `Envelope` (default) tags every frame with its kind so fragment text can
/// never be mistaken for a control marker.  `Sentinel` speaks the legacy
/// protocol: raw text frames terminated by a bare `END` or `ERROR` frame.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    #[default]
    Envelope,
    Sentinel,
}

impl WireFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            WireFormat::Envelope => "envelope",
            WireFormat::Sentinel => "sentinel",
        }
    }
}

impl std::str::FromStr for WireFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "envelope" => Ok(WireFormat::Envelope),
            "sentinel" | "legacy" => Ok(WireFormat::Sentinel),
            other => Err(format!("unknown wire format: {other}")),
        }
    }
}

/// What the relay does when a channel's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for queue space; reading from the upstream stream pauses meanwhile.
    #[default]
    Wait,
    /// Abort the request and close the channel.
    Disconnect,
}

// ── Server ────────────────────────────────────────────────────────────────────

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8000
}
fn default_outbound_queue() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.  The `PORT` environment variable takes precedence.
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub wire_format: WireFormat,
    /// Capacity of the per-channel queue between the upstream reader and the
    /// socket writer.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
    #[serde(default)]
    pub overflow: OverflowPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            wire_format: WireFormat::default(),
            outbound_queue: default_outbound_queue(),
            overflow: OverflowPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Model ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider identifier.  Run `rill list-providers` for the full list.
    pub provider: String,
    /// Model name forwarded to the provider API
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    /// Falls back to the driver's default, e.g. `GEMINI_API_KEY`.
    pub api_key_env: Option<String>,
    /// Explicit API key; prefer api_key_env in config files to avoid secrets
    /// in version-controlled files
    pub api_key: Option<String>,
    /// Base URL override, mostly useful for local proxies and tests.
    pub base_url: Option<String>,
    /// Maximum tokens to request in a single completion
    pub max_tokens: Option<u32>,
    /// Sampling temperature (0.0–2.0)
    pub temperature: Option<f32>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "google".into(),
            name: "gemini-2.0-flash".into(),
            api_key_env: None,
            api_key: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
        }
    }
}

// ── Client ────────────────────────────────────────────────────────────────────

fn default_url() -> String {
    "ws://127.0.0.1:8000/ws".into()
}
fn default_language() -> String {
    "javascript".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub wire_format: WireFormat,
    /// Language tag assigned to code fences that do not name one.
    #[serde(default = "default_language")]
    pub default_language: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            wire_format: WireFormat::default(),
            default_language: default_language(),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
