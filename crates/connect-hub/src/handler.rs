// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use connect_core::Message;

/// An observer notified of routed messages. Global handlers see everything;
/// per-agent handlers see messages where the agent is the receiver (always)
/// or the sender (only for COOLDOWN/STOP/SYSTEM — see `MessageType::is_special`).
#[async_trait]
pub trait Handler: Send + Sync {
    async fn on_message(&self, message: &Message);
}
