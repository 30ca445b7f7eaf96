// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("communication: {0}")]
    Communication(String),

    #[error("agent {0} is in cooldown")]
    Cooldown(String),

    #[error(transparent)]
    Core(#[from] connect_core::Error),
}
