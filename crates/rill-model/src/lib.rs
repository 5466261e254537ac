// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod types;
mod provider;
mod google;
mod mock;
pub mod registry;

pub use types::*;
pub use provider::{ModelProvider, ResponseStream};
pub use google::GoogleProvider;
pub use mock::{MockProvider, Script, ScriptedMockProvider};
pub use registry::{get_driver, list_drivers, DriverMeta};

use std::sync::Arc;

use anyhow::bail;
use rill_config::ModelConfig;

/// Construct a shared [`ModelProvider`] from configuration.
///
/// Provider selection:
/// - `"google"` → [`GoogleProvider`]
/// - `"mock"` → [`MockProvider`] (echo-back)
///
/// A missing Gemini key is not an error here; the first request reports it.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let key = resolve_api_key(cfg, |name| std::env::var(name).ok());
    match cfg.provider.as_str() {
        "google" => Ok(Arc::new(GoogleProvider::new(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        "mock" => Ok(Arc::new(MockProvider)),
        other => bail!("unknown model provider: {other}"),
    }
}

/// Explicit key, then the configured env var, then the driver's default env var.
fn resolve_api_key(cfg: &ModelConfig, env: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    let var = cfg
        .api_key_env
        .as_deref()
        .or_else(|| get_driver(&cfg.provider).and_then(|d| d.default_api_key_env))?;
    env(var).filter(|k| !k.is_empty())
}
