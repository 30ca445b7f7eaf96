// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use connect_hub::{CollaborationResult, HubHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct CheckInput {
    request_id: String,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    status: &'static str,
    content: Option<String>,
}

/// Polls the hub for the outcome of a previously-sent collaboration
/// request that has not yet resolved synchronously.
pub struct CheckCollaborationResultTool {
    hub: HubHandle,
}

impl CheckCollaborationResultTool {
    pub fn new(hub: HubHandle) -> Self {
        CheckCollaborationResultTool { hub }
    }
}

#[async_trait]
impl Tool for CheckCollaborationResultTool {
    fn name(&self) -> &str {
        "check_collaboration_result"
    }

    fn description(&self) -> &str {
        "Check whether a collaboration request has completed, timed out, or is still pending."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "request_id": { "type": "string" } },
            "required": ["request_id"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: CheckInput = match serde_json::from_value(call.args.clone()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let output = match self.hub.check_collaboration_result(&input.request_id).await {
            CollaborationResult::Completed(message) => CheckOutput {
                status: "completed",
                content: Some(message.content),
            },
            CollaborationResult::CompletedLate(message) => CheckOutput {
                status: "completed_late",
                content: Some(message.content),
            },
            CollaborationResult::Pending => CheckOutput {
                status: "pending",
                content: None,
            },
            CollaborationResult::NotFound => CheckOutput {
                status: "not_found",
                content: None,
            },
        };

        ToolOutput::json(&call.id, &output)
    }
}
