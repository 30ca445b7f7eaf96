// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use connect_hub::HubHandle;
use connect_index::{AgentRegistry, AgentType, CapabilityIndex};
use connect_runtime::Agent;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::tool::{Tool, ToolCall, ToolOutput};

const RECENT_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct SearchInput {
    capability_name: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default = "default_threshold")]
    similarity_threshold: f32,
}

fn default_limit() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.2
}

#[derive(Debug, Serialize)]
struct AgentMatch {
    agent_id: String,
    capability_name: String,
    description: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    matches: Vec<AgentMatch>,
    message: String,
}

/// Finds agents advertising a capability, excluding: the caller itself,
/// any HUMAN agent, agents the caller is already in conversation with,
/// agents the caller has a pending request from, and agents appearing in
/// the caller's last `RECENT_HISTORY_LIMIT` messages.
///
/// Runs in "standalone" mode (no caller/hub/registry/index wired) for
/// agents not attached to a live hub — in that mode it reports a
/// descriptive stub instead of erroring.
pub struct SearchForAgentsTool {
    caller_agent_id: String,
    caller: Option<Arc<Agent>>,
    registry: Option<Arc<AgentRegistry>>,
    index: Option<Arc<CapabilityIndex>>,
    hub: Option<HubHandle>,
}

impl SearchForAgentsTool {
    pub fn new(caller: Arc<Agent>, registry: Arc<AgentRegistry>, index: Arc<CapabilityIndex>, hub: HubHandle) -> Self {
        SearchForAgentsTool {
            caller_agent_id: caller.agent_id.clone(),
            caller: Some(caller),
            registry: Some(registry),
            index: Some(index),
            hub: Some(hub),
        }
    }

    pub fn standalone(caller_agent_id: impl Into<String>) -> Self {
        SearchForAgentsTool {
            caller_agent_id: caller_agent_id.into(),
            caller: None,
            registry: None,
            index: None,
            hub: None,
        }
    }

    /// The full exclusion set per SPEC_FULL.md §4.7: the caller itself,
    /// every HUMAN agent, agents in active conversation or with a pending
    /// request from the caller, and agents in the caller's recent history.
    async fn excluded_agents(&self, registry: &AgentRegistry, caller: &Agent, hub: &HubHandle) -> HashSet<String> {
        let mut excluded: HashSet<String> = registry
            .get_all_agents()
            .into_iter()
            .filter(|r| r.agent_type == AgentType::Human)
            .map(|r| r.agent_id)
            .collect();
        excluded.insert(self.caller_agent_id.clone());
        excluded.extend(caller.active_conversation_peers().await);
        excluded.extend(caller.pending_request_peers().await);

        let recent_peers = hub
            .history()
            .await
            .into_iter()
            .rev()
            .filter(|m| m.sender_id == self.caller_agent_id || m.receiver_id == self.caller_agent_id)
            .take(RECENT_HISTORY_LIMIT)
            .map(|m| {
                if m.sender_id == self.caller_agent_id {
                    m.receiver_id
                } else {
                    m.sender_id
                }
            });
        excluded.extend(recent_peers);

        excluded
    }
}

#[async_trait]
impl Tool for SearchForAgentsTool {
    fn name(&self) -> &str {
        "search_for_agents"
    }

    fn description(&self) -> &str {
        "Search the capability index for other agents that can perform a named capability."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "capability_name": { "type": "string" },
                "limit": { "type": "integer", "default": 5 },
                "similarity_threshold": { "type": "number", "default": 0.2 },
            },
            "required": ["capability_name"],
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let input: SearchInput = match serde_json::from_value(call.args.clone()) {
            Ok(v) => v,
            Err(e) => return ToolOutput::err(&call.id, format!("invalid arguments: {e}")),
        };

        let (Some(registry), Some(index), Some(caller), Some(hub)) =
            (&self.registry, &self.index, &self.caller, &self.hub)
        else {
            return ToolOutput::ok(
                &call.id,
                format!(
                    "standalone mode: no hub connected, cannot search for '{}'",
                    input.capability_name
                ),
            );
        };

        let excluded = self.excluded_agents(registry, caller, hub).await;

        let matches: Vec<AgentMatch> = index
            .find_by_name(&input.capability_name, input.limit + excluded.len(), input.similarity_threshold)
            .into_iter()
            .filter(|r| !excluded.contains(&r.agent_id))
            .take(input.limit)
            .map(|r| {
                let exact_cap = r.capabilities.iter().find(|c| c.name == input.capability_name);
                AgentMatch {
                    agent_id: r.agent_id.clone(),
                    capability_name: input.capability_name.clone(),
                    description: exact_cap
                        .map(|c| c.description.clone())
                        .or_else(|| r.capabilities.first().map(|c| c.description.clone()))
                        .unwrap_or_default(),
                    score: if exact_cap.is_some() { 1.0 } else { 0.0 },
                }
            })
            .collect();

        let message = if matches.is_empty() {
            format!("no agents found for capability '{}'", input.capability_name)
        } else {
            format!("found {} matching agent(s)", matches.len())
        };

        ToolOutput::json(&call.id, &SearchOutput { matches, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use connect_core::{AgentIdentity, Message, MessageType};
    use connect_index::{AgentRegistration, Capability, InteractionMode};
    use connect_runtime::NoopHandler;
    use std::collections::HashMap;
    use std::time::Duration;

    fn registration(agent_id: &str, agent_type: AgentType, capability: &str) -> AgentRegistration {
        AgentRegistration {
            agent_id: agent_id.to_string(),
            organization_id: None,
            agent_type,
            interaction_modes: vec![InteractionMode::AgentToAgent],
            capabilities: vec![Capability {
                name: capability.to_string(),
                description: format!("{capability} provided by {agent_id}"),
                input_schema: None,
                output_schema: None,
                version: "1.0".to_string(),
            }],
            identity: AgentIdentity::generate_key_based().unwrap(),
            owner_id: None,
            payment_address: None,
            metadata: HashMap::new(),
        }
    }

    fn make_caller(agent_id: &str, hub: HubHandle) -> Arc<Agent> {
        Agent::new(
            agent_id,
            AgentIdentity::generate_key_based().unwrap(),
            Arc::new(hub),
            Arc::new(NoopHandler),
            5500,
            100_000,
            20,
            Duration::from_millis(5),
        )
    }

    #[tokio::test]
    async fn finds_exact_capability_match() {
        let registry = Arc::new(AgentRegistry::new());
        let index = Arc::new(CapabilityIndex::new());
        let hub = HubHandle::new(registry.clone());
        let reg = registration("agent-b", AgentType::Ai, "summarize");
        registry.register(reg.clone()).unwrap();
        index.add(&reg);

        let caller = make_caller("agent-a", hub.clone());
        hub.register_agent(caller.clone()).await;
        let tool = SearchForAgentsTool::new(caller, registry, index, hub);
        let call = ToolCall {
            id: "1".into(),
            name: "search_for_agents".into(),
            args: json!({"capability_name": "summarize"}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("agent-b"));
    }

    #[tokio::test]
    async fn excludes_human_agents() {
        let registry = Arc::new(AgentRegistry::new());
        let index = Arc::new(CapabilityIndex::new());
        let hub = HubHandle::new(registry.clone());
        let reg = registration("human-1", AgentType::Human, "summarize");
        registry.register(reg.clone()).unwrap();
        index.add(&reg);

        let caller = make_caller("agent-a", hub.clone());
        hub.register_agent(caller.clone()).await;
        let tool = SearchForAgentsTool::new(caller, registry, index, hub);
        let call = ToolCall {
            id: "1".into(),
            name: "search_for_agents".into(),
            args: json!({"capability_name": "summarize"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.content.contains("no agents found"));
    }

    #[tokio::test]
    async fn excludes_agent_in_active_conversation() {
        let registry = Arc::new(AgentRegistry::new());
        let index = Arc::new(CapabilityIndex::new());
        let hub = HubHandle::new(registry.clone());
        let reg = registration("agent-b", AgentType::Ai, "summarize");
        registry.register(reg.clone()).unwrap();
        index.add(&reg);

        let caller = make_caller("agent-a", hub.clone());
        hub.register_agent(caller.clone()).await;
        let handle = caller.handle();
        let runner = tokio::spawn(caller.clone().run());
        handle
            .deliver(Message::new("agent-b", "agent-a", "hi", MessageType::Text, HashMap::new()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let tool = SearchForAgentsTool::new(caller, registry, index, hub);
        let call = ToolCall {
            id: "1".into(),
            name: "search_for_agents".into(),
            args: json!({"capability_name": "summarize"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.content.contains("no agents found"));
        runner.abort();
    }

    #[tokio::test]
    async fn excludes_agent_from_recent_history() {
        let registry = Arc::new(AgentRegistry::new());
        let index = Arc::new(CapabilityIndex::new());
        let hub = HubHandle::new(registry.clone());
        let reg = registration("agent-b", AgentType::Ai, "summarize");
        registry.register(reg.clone()).unwrap();
        index.add(&reg);

        let caller = make_caller("agent-a", hub.clone());
        hub.register_agent(caller.clone()).await;
        hub.route_message(Message::new("agent-a", "agent-b", "hello", MessageType::System, HashMap::new()))
            .await
            .unwrap();

        let tool = SearchForAgentsTool::new(caller, registry, index, hub);
        let call = ToolCall {
            id: "1".into(),
            name: "search_for_agents".into(),
            args: json!({"capability_name": "summarize"}),
        };
        let out = tool.execute(&call).await;
        assert!(out.content.contains("no agents found"));
    }

    #[tokio::test]
    async fn standalone_mode_reports_stub() {
        let tool = SearchForAgentsTool::standalone("agent-a");
        let call = ToolCall {
            id: "1".into(),
            name: "search_for_agents".into(),
            args: json!({"capability_name": "summarize"}),
        };
        let out = tool.execute(&call).await;
        assert!(!out.is_error);
        assert!(out.content.contains("standalone"));
    }
}
