// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_max_tokens_per_minute() -> u32 {
    5500
}

fn default_max_tokens_per_hour() -> u32 {
    100_000
}

fn default_max_turns() -> u32 {
    20
}

fn default_similarity_threshold() -> f32 {
    0.2
}

fn default_collaboration_max_chain_length() -> usize {
    5
}

fn default_collaboration_default_timeout_seconds() -> u64 {
    60
}

fn default_collaboration_max_timeout_seconds() -> u64 {
    300
}

fn default_late_response_grace_seconds() -> u64 {
    60
}

fn default_queue_poll_interval_ms() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub index: IndexConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            runtime: RuntimeConfig::default(),
            hub: HubConfig::default(),
            index: IndexConfig::default(),
        }
    }
}

/// Tunables governing a single agent's rate limiting and conversation bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Token budget per rolling 60s window before a cooldown is scheduled.
    #[serde(default = "default_max_tokens_per_minute")]
    pub max_tokens_per_minute: u32,
    /// Token budget per rolling 3600s window before a cooldown is scheduled.
    #[serde(default = "default_max_tokens_per_hour")]
    pub max_tokens_per_hour: u32,
    /// Per-conversation turn cap; the next message past this count ends the
    /// conversation with STOP.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Poll cadence for the non-blocking queue-drain loop.
    #[serde(default = "default_queue_poll_interval_ms")]
    pub queue_poll_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_tokens_per_minute: default_max_tokens_per_minute(),
            max_tokens_per_hour: default_max_tokens_per_hour(),
            max_turns: default_max_turns(),
            queue_poll_interval_ms: default_queue_poll_interval_ms(),
        }
    }
}

/// Tunables governing the hub's request/response correlation and
/// collaboration-chain policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default = "default_collaboration_max_chain_length")]
    pub collaboration_max_chain_length: usize,
    #[serde(default = "default_collaboration_default_timeout_seconds")]
    pub collaboration_default_timeout_seconds: u64,
    #[serde(default = "default_collaboration_max_timeout_seconds")]
    pub collaboration_max_timeout_seconds: u64,
    /// How long a resolved-or-timed-out pending response is kept around so a
    /// late reply can still be captured.
    #[serde(default = "default_late_response_grace_seconds")]
    pub late_response_grace_seconds: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            collaboration_max_chain_length: default_collaboration_max_chain_length(),
            collaboration_default_timeout_seconds: default_collaboration_default_timeout_seconds(),
            collaboration_max_timeout_seconds: default_collaboration_max_timeout_seconds(),
            late_response_grace_seconds: default_late_response_grace_seconds(),
        }
    }
}

/// Tunables governing capability discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Normalized-score threshold applied to semantic search results.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}
