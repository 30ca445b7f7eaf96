// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod error;
mod identity;
mod message;
mod protocol;

pub use error::Error;
pub use identity::{AgentIdentity, VerificationStatus};
pub use message::{Message, MessageType};
pub use protocol::{
    CapabilityResponsePayload, CollaborationErrorPayload, CollaborationProtocol,
    CollaborationResponsePayload, Protocol, ProtocolVersion, RequestCapabilityPayload,
    RequestCollaborationPayload, SimpleAgentProtocol,
};

pub type Result<T> = std::result::Result<T, Error>;
