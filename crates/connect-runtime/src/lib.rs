// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod agent;
mod error;
mod rate_limit;

pub use agent::{Agent, AgentHandle, MessageHandler, NoopHandler, OutboundRouter};
pub use error::Error;
pub use rate_limit::TokenBucket;

pub type Result<T> = std::result::Result<T, Error>;
