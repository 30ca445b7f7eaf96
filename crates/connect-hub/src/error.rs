// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("security: {0}")]
    Security(String),

    #[error("routing: {0}")]
    Routing(String),

    #[error("chain: {0}")]
    Chain(String),

    #[error(transparent)]
    Core(#[from] connect_core::Error),

    #[error(transparent)]
    Runtime(#[from] connect_runtime::Error),
}
