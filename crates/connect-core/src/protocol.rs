// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::identity::AgentIdentity;
use crate::message::{Message, MessageType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V1_0,
}

impl ProtocolVersion {
    fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V1_0 => "1.0",
        }
    }
}

fn base_supported_types() -> HashSet<MessageType> {
    use MessageType::*;
    HashSet::from([
        Text,
        Command,
        Response,
        Verification,
        System,
        Error,
        Ignore,
        RequestCollaboration,
        CollaborationResponse,
        CollaborationError,
    ])
}

/// Shared shape-validation and message-formatting contract. Each concrete
/// protocol narrows or widens the set of message types it permits.
pub trait Protocol {
    fn version(&self) -> ProtocolVersion;
    fn supported_message_types(&self) -> &HashSet<MessageType>;
    fn protocol_type(&self) -> &'static str;

    fn supports(&self, message_type: MessageType) -> bool {
        self.supported_message_types().contains(&message_type)
    }

    /// Build and sign a message, injecting `{protocol_version, protocol_type}`
    /// into its metadata.
    fn format_message(
        &self,
        sender_identity: &AgentIdentity,
        receiver_id: &str,
        content: &str,
        message_type: MessageType,
        mut metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Message, Error> {
        if !self.supports(message_type) {
            return Err(Error::Communication(format!(
                "message type {message_type:?} is not supported by protocol {}",
                self.protocol_type()
            )));
        }
        metadata.insert(
            "protocol_version".to_string(),
            serde_json::Value::String(self.version().as_str().to_string()),
        );
        metadata.insert(
            "protocol_type".to_string(),
            serde_json::Value::String(self.protocol_type().to_string()),
        );
        let mut message = Message::new(
            sender_identity.did.clone(),
            receiver_id,
            content,
            message_type,
            metadata,
        );
        message.sign(sender_identity)?;
        Ok(message)
    }

    /// Validate a message's protocol version and type against this protocol's
    /// accepted set. Reports false rather than erroring so the caller can
    /// decide policy.
    fn validate_message(&self, message: &Message) -> bool {
        let version_ok = message
            .metadata
            .get("protocol_version")
            .and_then(|v| v.as_str())
            .map(|v| v == self.version().as_str())
            .unwrap_or(false);
        version_ok && self.supports(message.message_type)
    }
}

pub struct SimpleAgentProtocol {
    version: ProtocolVersion,
    supported: HashSet<MessageType>,
}

impl Default for SimpleAgentProtocol {
    fn default() -> Self {
        let mut supported = base_supported_types();
        supported.insert(MessageType::Capability);
        supported.insert(MessageType::Protocol);
        SimpleAgentProtocol {
            version: ProtocolVersion::V1_0,
            supported,
        }
    }
}

impl Protocol for SimpleAgentProtocol {
    fn version(&self) -> ProtocolVersion {
        self.version
    }
    fn supported_message_types(&self) -> &HashSet<MessageType> {
        &self.supported
    }
    fn protocol_type(&self) -> &'static str {
        "agent"
    }
}

pub struct CollaborationProtocol {
    version: ProtocolVersion,
    supported: HashSet<MessageType>,
}

impl Default for CollaborationProtocol {
    fn default() -> Self {
        let mut supported = base_supported_types();
        supported.insert(MessageType::Capability);
        CollaborationProtocol {
            version: ProtocolVersion::V1_0,
            supported,
        }
    }
}

impl Protocol for CollaborationProtocol {
    fn version(&self) -> ProtocolVersion {
        self.version
    }
    fn supported_message_types(&self) -> &HashSet<MessageType> {
        &self.supported
    }
    fn protocol_type(&self) -> &'static str {
        "collaboration"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RequestCapabilityPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponsePayload {
    pub request_id: String,
    pub capabilities: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestCollaborationPayload {
    pub capability_name: String,
    pub input_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResponsePayload {
    pub request_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationErrorPayload {
    pub request_id: String,
    pub error_code: String,
    pub error_message: String,
}
