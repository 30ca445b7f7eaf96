// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Error;
use crate::identity::AgentIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Text,
    Command,
    Response,
    Error,
    Verification,
    Capability,
    Protocol,
    Stop,
    System,
    Cooldown,
    Ignore,
    RequestCollaboration,
    CollaborationResponse,
    CollaborationError,
}

impl MessageType {
    /// Types the hub fans out to both sender-side and receiver-side handlers,
    /// rather than receiver-side only.
    pub fn is_special(self) -> bool {
        matches!(self, MessageType::Cooldown | MessageType::Stop | MessageType::System)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub protocol_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Message {
    /// Construct an unsigned message. The timestamp is captured once, here,
    /// and that exact value participates in both signing and later
    /// re-verification.
    pub fn new(
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
        message_type: MessageType,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            message_type,
            timestamp: Utc::now(),
            metadata,
            protocol_version: "1.0".to_string(),
            signature: None,
        }
    }

    /// The exact delimited tuple covered by the signature:
    /// `id:sender_id:receiver_id:content:timestamp`.
    fn signable_content(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.id,
            self.sender_id,
            self.receiver_id,
            self.content,
            self.timestamp.to_rfc3339()
        )
    }

    pub fn sign(&mut self, identity: &AgentIdentity) -> Result<(), Error> {
        let digest = self.signable_content();
        let sig = identity.sign_bytes(digest.as_bytes())?;
        self.signature = Some(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            sig,
        ));
        Ok(())
    }

    /// Verify this message's signature against `sender_identity`. Returns an
    /// error (not `Ok(false)`) when the sender identity is not itself
    /// verified — that case is a security failure, not a routine mismatch.
    pub fn verify(&self, sender_identity: &AgentIdentity) -> Result<bool, Error> {
        let Some(sig_b64) = &self.signature else {
            return Ok(false);
        };
        let sig = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, sig_b64)
            .map_err(|e| Error::Security(e.to_string()))?;
        let digest = self.signable_content();
        sender_identity.verify_bytes(digest.as_bytes(), &sig)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.metadata.get("request_id").and_then(|v| v.as_str())
    }

    pub fn response_to(&self) -> Option<&str> {
        self.metadata.get("response_to").and_then(|v| v.as_str())
    }

    pub fn set_response_to(&mut self, request_id: impl Into<String>) {
        self.metadata
            .insert("response_to".to_string(), serde_json::Value::String(request_id.into()));
    }

    pub fn collaboration_chain(&self) -> Vec<String> {
        self.metadata
            .get("collaboration_chain")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    #[test]
    fn signed_message_verifies() {
        let id = AgentIdentity::generate_key_based().unwrap();
        let mut m = Message::new("a", "b", "hello", MessageType::Text, meta());
        m.sign(&id).unwrap();
        assert!(m.verify(&id).unwrap());
    }

    #[test]
    fn mutated_content_fails_verification() {
        let id = AgentIdentity::generate_key_based().unwrap();
        let mut m = Message::new("a", "b", "hello", MessageType::Text, meta());
        m.sign(&id).unwrap();
        m.content = "goodbye".to_string();
        assert!(!m.verify(&id).unwrap());
    }

    #[test]
    fn unsigned_message_does_not_verify() {
        let id = AgentIdentity::generate_key_based().unwrap();
        let m = Message::new("a", "b", "hello", MessageType::Text, meta());
        assert!(!m.verify(&id).unwrap());
    }

    #[test]
    fn special_types_are_marked() {
        assert!(MessageType::Stop.is_special());
        assert!(MessageType::Cooldown.is_special());
        assert!(MessageType::System.is_special());
        assert!(!MessageType::Text.is_special());
    }
}
