// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connect_hub::HubHandle;
use connect_runtime::Agent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

#[derive(Debug, Deserialize)]
struct RequestInput {
    receiver_id: String,
    task: String,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct RequestOutput {
    success: bool,
    response: String,
}

/// Delegates a task to another agent through the hub and waits for its
/// response, subject to the hub's chain-hygiene and timeout rules.
pub struct SendCollaborationRequestTool {
    sender: Arc<Agent>,
    hub: HubHandle,
}

impl SendCollaborationRequestTool {
    pub fn new(sender: Arc<Agent>, hub: HubHandle) -> Self {
        SendCollaborationRequestTool { sender, hub }
    }
}

#[async_trait]
impl Tool for SendCollaborationRequestTool {
    fn name(&self) -> &str {
        "send_collaboration_request"
    }

    fn description(&self) -> &str {
        "Delegate a task to another agent and wait for its response."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "receiver_id": { "type": "string" },
                "task": { "type": "string" },
                "timeout_seconds": { "type": "integer" },
            },
            "required": ["receiver_id", "task"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: RequestInput = match serde_json::from_value(call.args.clone()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let explicit_timeout = input.timeout_seconds.map(Duration::from_secs);
        match self
            .hub
            .send_collaboration_request(&self.sender, &input.receiver_id, &input.task, explicit_timeout, None)
            .await
        {
            Ok(response) => ToolOutput::json(
                &call.id,
                &RequestOutput {
                    success: true,
                    response,
                },
            ),
            Err(e) => ToolOutput::err(&call.id, format!("collaboration request failed: {e}")),
        }
    }
}
