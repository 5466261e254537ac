// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // 1. System-wide default
    paths.push(PathBuf::from("/etc/rill/config.toml"));

    // 2. XDG / home
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/rill/config.toml"));
    }
    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("rill/config.toml"));
    }

    // 3. Working directory
    paths.push(PathBuf::from("rill.toml"));

    paths
}

/// Load configuration by merging all discovered TOML files, then applying
/// environment overrides.
/// The `extra` argument may provide an explicit path (e.g. `--config` CLI flag).
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_toml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_toml(&mut merged, read_layer(p)?);
    }

    let mut config: Config = merged.try_into().context("invalid configuration")?;
    apply_env(&mut config);
    Ok(config)
}

fn read_layer(path: &Path) -> anyhow::Result<toml::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Apply process environment overrides (`PORT`, `RILL_WIRE_FORMAT`).
pub fn apply_env(config: &mut Config) {
    apply_env_from(config, |key| std::env::var(key).ok());
}

fn apply_env_from(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = lookup("PORT") {
        match port.trim().parse::<u16>() {
            Ok(p) => config.server.port = p,
            Err(_) => warn!(value = %port, "ignoring invalid PORT"),
        }
    }
    if let Some(fmt) = lookup("RILL_WIRE_FORMAT") {
        match fmt.parse() {
            Ok(f) => {
                config.server.wire_format = f;
                config.client.wire_format = f;
            }
            Err(e) => warn!("ignoring RILL_WIRE_FORMAT: {e}"),
        }
    }
}

/// Deep-merge `src` into `dst`; src wins on scalar conflicts.
fn merge_toml(dst: &mut toml::Value, src: toml::Value) {
    match (dst, src) {
        (toml::Value::Table(d), toml::Value::Table(s)) => {
            for (k, v) in s {
                let entry = d.entry(k).or_insert(toml::Value::Table(toml::map::Map::new()));
                merge_toml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
