// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod capability_index;
mod error;
mod registration;
mod registry;

pub use capability_index::{CapabilityIndex, EmbeddingBackend, JaccardBackend, ScoredRegistration};
pub use error::Error;
pub use registration::{AgentRegistration, AgentType, Capability, InteractionMode};
pub use registry::AgentRegistry;

pub type Result<T> = std::result::Result<T, Error>;
