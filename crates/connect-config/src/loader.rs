// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Ordered list of config file locations searched from lowest to highest priority.
/// Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/agent-connect/config.toml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("agent-connect/config.toml"));
    }

    paths.push(PathBuf::from(".agent-connect.toml"));

    paths
}

/// Load configuration: defaults, overlaid by any discovered TOML file, overlaid
/// by an explicit `--config` path, overlaid by `CONNECT_*` environment variables.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = toml::Value::Table(toml::map::Map::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            merge_file(&mut merged, &path)?;
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        merge_file(&mut merged, p)?;
    }

    let mut config: Config = if matches!(merged, toml::Value::Table(ref t) if t.is_empty()) {
        Config::default()
    } else {
        merged.try_into().unwrap_or_else(|_| Config::default())
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

fn merge_file(dst: &mut toml::Value, path: &Path) -> anyhow::Result<()> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let layer: toml::Value =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    merge_toml(dst, layer);
    Ok(())
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

fn apply_env_overrides(config: &mut Config) {
    if let Ok(v) = std::env::var("CONNECT_MAX_TOKENS_PER_MINUTE") {
        if let Ok(v) = v.parse() {
            config.runtime.max_tokens_per_minute = v;
        }
    }
    if let Ok(v) = std::env::var("CONNECT_MAX_TOKENS_PER_HOUR") {
        if let Ok(v) = v.parse() {
            config.runtime.max_tokens_per_hour = v;
        }
    }
    if let Ok(v) = std::env::var("CONNECT_MAX_TURNS") {
        if let Ok(v) = v.parse() {
            config.runtime.max_turns = v;
        }
    }
    if let Ok(v) = std::env::var("CONNECT_SIMILARITY_THRESHOLD") {
        if let Ok(v) = v.parse() {
            config.index.similarity_threshold = v;
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
