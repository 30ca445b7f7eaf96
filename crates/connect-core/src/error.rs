// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// Behavioral error categories shared across the communication substrate.
///
/// Variants are named by what went wrong, not by which exception class the
/// upstream implementation used to raise it.
#[derive(Debug, Error)]
pub enum Error {
    #[error("security: {0}")]
    Security(String),

    #[error("registration: {0}")]
    Registration(String),

    #[error("communication: {0}")]
    Communication(String),

    #[error("capability: {0}")]
    Capability(String),

    #[error("configuration: {0}")]
    Configuration(String),

    #[error("signing key unavailable for this identity")]
    NoPrivateKey,

    #[error(transparent)]
    Rsa(#[from] rsa::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
