// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use rsa::pss::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Error;

const RSA_KEY_BITS: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

/// An agent's decentralized identity: a DID, its public key, and (for the
/// owning process only) the matching private key.
///
/// Two DID methods are supported: `did:key:<fingerprint>` for a locally
/// generated RSA key pair, and `did:ethr:0x<address>` for an externally
/// resolved Ethereum-style identity with no local key material.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub did: String,
    /// DER-encoded SubjectPublicKeyInfo, base64.
    pub public_key: String,
    /// DER-encoded PKCS#8 private key, base64. Present only for identities
    /// this process owns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    pub verification_status: VerificationStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl std::fmt::Debug for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentIdentity")
            .field("did", &self.did)
            .field("verification_status", &self.verification_status)
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

impl AgentIdentity {
    /// Generate a fresh `did:key:` identity with a locally held RSA key pair.
    pub fn generate_key_based() -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, RSA_KEY_BITS)?;
        let public = RsaPublicKey::from(&private);

        let public_der = rsa::pkcs8::EncodePublicKey::to_public_key_der(&public)
            .map_err(|e| Error::Security(e.to_string()))?;
        let private_der = rsa::pkcs8::EncodePrivateKey::to_pkcs8_der(&private)
            .map_err(|e| Error::Security(e.to_string()))?;

        let fingerprint = {
            use sha2::Digest;
            let digest = sha2::Sha256::digest(public_der.as_bytes());
            base64::Engine::encode(
                &base64::engine::general_purpose::URL_SAFE_NO_PAD,
                &digest[..12],
            )
        };

        Ok(AgentIdentity {
            did: format!("did:key:{fingerprint}"),
            public_key: base64_encode(public_der.as_bytes()),
            private_key: Some(base64_encode(private_der.as_bytes())),
            verification_status: VerificationStatus::Verified,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        })
    }

    /// Construct a remotely-resolved `did:ethr:` identity with no local
    /// signing capability — used to represent the other side of a
    /// conversation whose key material we never hold.
    pub fn ethr_stub(address: &str) -> Self {
        AgentIdentity {
            did: format!("did:ethr:{address}"),
            public_key: String::new(),
            private_key: None,
            verification_status: VerificationStatus::Pending,
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn private_key(&self) -> Result<RsaPrivateKey, Error> {
        let encoded = self.private_key.as_ref().ok_or(Error::NoPrivateKey)?;
        let der = base64_decode(encoded).map_err(|e| Error::Security(e.to_string()))?;
        rsa::pkcs8::DecodePrivateKey::from_pkcs8_der(&der)
            .map_err(|e| Error::Security(e.to_string()))
    }

    fn public_key(&self) -> Result<RsaPublicKey, Error> {
        let der = base64_decode(&self.public_key).map_err(|e| Error::Security(e.to_string()))?;
        rsa::pkcs8::DecodePublicKey::from_public_key_der(&der)
            .map_err(|e| Error::Security(e.to_string()))
    }

    /// Sign arbitrary bytes (the message's signable digest) with RSA-PSS-SHA256.
    pub fn sign_bytes(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let private = self.private_key()?;
        let signing_key = SigningKey::<Sha256>::new(private);
        let mut rng = rand::thread_rng();
        let signature: Signature = signing_key.sign_with_rng(&mut rng, data);
        Ok(signature.to_vec())
    }

    /// Verify a signature over `data` produced by [`sign_bytes`]. Fails closed:
    /// an unverified identity never validates, even with a correct signature.
    pub fn verify_bytes(&self, data: &[u8], signature: &[u8]) -> Result<bool, Error> {
        if self.verification_status != VerificationStatus::Verified {
            return Err(Error::Security(format!(
                "identity {} is not verified",
                self.did
            )));
        }
        let public = self.public_key()?;
        let verifying_key = VerifyingKey::<Sha256>::new(public);
        let signature = Signature::try_from(signature)
            .map_err(|e| Error::Security(format!("malformed signature: {e}")))?;
        Ok(verifying_key.verify(data, &signature).is_ok())
    }

    /// Shallow DID-format check, mirroring the upstream placeholder: confirms
    /// the method prefix and the expected shape, without resolving anything.
    pub fn verify_did_format(&self) -> bool {
        if let Some(addr) = self.did.strip_prefix("did:ethr:") {
            addr.strip_prefix("0x")
                .map(|hex| hex.len() == 40 && hex.chars().all(|c| c.is_ascii_hexdigit()))
                .unwrap_or(false)
        } else if let Some(rest) = self.did.strip_prefix("did:key:") {
            !rest.is_empty()
        } else {
            false
        }
    }
}

fn base64_encode(bytes: &[u8]) -> String {
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes)
}

fn base64_decode(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_identity_round_trips_signature() {
        let id = AgentIdentity::generate_key_based().unwrap();
        let sig = id.sign_bytes(b"hello world").unwrap();
        assert!(id.verify_bytes(b"hello world", &sig).unwrap());
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let id = AgentIdentity::generate_key_based().unwrap();
        let sig = id.sign_bytes(b"hello world").unwrap();
        assert!(!id.verify_bytes(b"goodbye world", &sig).unwrap());
    }

    #[test]
    fn unverified_identity_refuses_to_verify() {
        let mut id = AgentIdentity::generate_key_based().unwrap();
        let sig = id.sign_bytes(b"hi").unwrap();
        id.verification_status = VerificationStatus::Pending;
        assert!(id.verify_bytes(b"hi", &sig).is_err());
    }

    #[test]
    fn key_did_format_is_valid() {
        let id = AgentIdentity::generate_key_based().unwrap();
        assert!(id.verify_did_format());
    }

    #[test]
    fn ethr_did_requires_forty_hex_chars() {
        let good = AgentIdentity::ethr_stub(&format!("0x{}", "a".repeat(40)));
        assert!(good.verify_did_format());
        let bad = AgentIdentity::ethr_stub("0xdeadbeef");
        assert!(!bad.verify_did_format());
    }
}
