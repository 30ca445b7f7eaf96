// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod check_collaboration_result;
mod registry;
mod search_for_agents;
mod send_collaboration_request;
mod tool;

pub use check_collaboration_result::CheckCollaborationResultTool;
pub use registry::{ToolRegistry, ToolSchema};
pub use search_for_agents::SearchForAgentsTool;
pub use send_collaboration_request::SendCollaborationRequestTool;
pub use tool::{Tool, ToolCall, ToolOutput};
