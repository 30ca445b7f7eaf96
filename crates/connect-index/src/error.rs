// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("registration: {0}")]
    Registration(String),

    #[error("agent not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Core(#[from] connect_core::Error),
}
