// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde_json::Value;

/// A single tool invocation requested by an agent.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments
    pub args: Value,
}

/// The result of executing a tool.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        ToolOutput {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        ToolOutput {
            call_id: call_id.into(),
            content: msg.into(),
            is_error: true,
        }
    }

    /// JSON-serialize a success output, falling back to an error output if
    /// serialization somehow fails.
    pub fn json(call_id: impl Into<String>, value: &impl serde::Serialize) -> Self {
        let call_id = call_id.into();
        match serde_json::to_string(value) {
            Ok(text) => ToolOutput::ok(call_id, text),
            Err(e) => ToolOutput::err(call_id, format!("failed to serialize output: {e}")),
        }
    }
}

/// Trait every collaboration tool implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    /// Execute the tool. Errors should be wrapped in [`ToolOutput::err`].
    async fn execute(&self, call: &ToolCall) -> ToolOutput;
}
