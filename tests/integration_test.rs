// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-crate conversation-lifecycle scenarios, exercising `connect-hub`
//! and `connect-runtime` together the way a deployed agent mesh would.
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use connect_core::{AgentIdentity, Message, MessageType};
use connect_hub::HubHandle;
use connect_index::{AgentRegistration, AgentRegistry, AgentType, Capability, InteractionMode};
use connect_runtime::{Agent, MessageHandler, NoopHandler};

struct RecordingHandler {
    received: Arc<StdMutex<Vec<Message>>>,
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn process_message(&self, message: &Message) -> Option<Message> {
        self.received.lock().unwrap().push(message.clone());
        None
    }
}

fn registration(agent_id: &str, agent_type: AgentType, identity: AgentIdentity) -> AgentRegistration {
    AgentRegistration {
        agent_id: agent_id.to_string(),
        organization_id: None,
        agent_type,
        interaction_modes: vec![InteractionMode::AgentToAgent],
        capabilities: vec![Capability {
            name: "chat".to_string(),
            description: "general conversation".to_string(),
            input_schema: None,
            output_schema: None,
            version: "1.0".to_string(),
        }],
        identity,
        owner_id: None,
        payment_address: None,
        metadata: HashMap::new(),
    }
}

/// Registers `agent_id` (sharing one identity between the registry entry and
/// the live `Agent`, as a real deployment would) and returns the handle.
fn spawn_registered_agent(
    agent_id: &str,
    agent_type: AgentType,
    registry: &Arc<AgentRegistry>,
    hub: HubHandle,
    handler: Arc<dyn MessageHandler>,
) -> Arc<Agent> {
    let identity = AgentIdentity::generate_key_based().unwrap();
    registry
        .register(registration(agent_id, agent_type, identity.clone()))
        .unwrap();
    Agent::new(
        agent_id,
        identity,
        Arc::new(hub),
        handler,
        5500,
        100_000,
        20,
        Duration::from_millis(5),
    )
}

#[tokio::test]
async fn cooldown_notice_reaches_only_the_human_receiver() {
    let registry = Arc::new(AgentRegistry::new());
    let hub = HubHandle::new(registry.clone());
    let human_seen = Arc::new(StdMutex::new(Vec::new()));
    let ai_seen = Arc::new(StdMutex::new(Vec::new()));

    let human_agent = spawn_registered_agent(
        "human-1",
        AgentType::Human,
        &registry,
        hub.clone(),
        Arc::new(RecordingHandler { received: human_seen.clone() }),
    );
    let ai_agent = spawn_registered_agent(
        "ai-1",
        AgentType::Ai,
        &registry,
        hub.clone(),
        Arc::new(RecordingHandler { received: ai_seen.clone() }),
    );
    registry.register(registration("sender", AgentType::Ai, AgentIdentity::generate_key_based().unwrap())).unwrap();
    hub.register_agent(human_agent.clone()).await;
    hub.register_agent(ai_agent.clone()).await;

    let human_runner = tokio::spawn(human_agent.clone().run());
    let ai_runner = tokio::spawn(ai_agent.clone().run());

    hub.route_message(Message::new("sender", "ai-1", "peer cooling down", MessageType::Cooldown, HashMap::new()))
        .await
        .unwrap();
    hub.route_message(Message::new("sender", "human-1", "peer cooling down", MessageType::Cooldown, HashMap::new()))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    human_runner.abort();
    ai_runner.abort();

    assert!(ai_seen.lock().unwrap().is_empty(), "AI receivers never see a COOLDOWN notice");
    assert_eq!(human_seen.lock().unwrap().len(), 1, "the human receiver gets exactly one COOLDOWN notice");
}

#[tokio::test]
async fn stop_ends_the_conversation_and_acknowledges_with_ignore() {
    let registry = Arc::new(AgentRegistry::new());
    let hub = HubHandle::new(registry.clone());

    let a_seen = Arc::new(StdMutex::new(Vec::new()));
    let agent_a = spawn_registered_agent(
        "agent-a",
        AgentType::Ai,
        &registry,
        hub.clone(),
        Arc::new(RecordingHandler { received: a_seen.clone() }),
    );
    let agent_b = spawn_registered_agent("agent-b", AgentType::Ai, &registry, hub.clone(), Arc::new(NoopHandler));
    hub.register_agent(agent_a.clone()).await;
    hub.register_agent(agent_b.clone()).await;

    let a_runner = tokio::spawn(agent_a.clone().run());
    let b_runner = tokio::spawn(agent_b.clone().run());

    agent_a.send_message("agent-b", "hello", MessageType::Text, HashMap::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(agent_b.active_conversation_peers().await, vec!["agent-a".to_string()]);

    agent_a.send_message("agent-b", "done", MessageType::Stop, HashMap::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;

    assert!(agent_b.active_conversation_peers().await.is_empty(), "STOP must end the conversation on the receiver");

    let received = a_seen.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].message_type, MessageType::Ignore);

    a_runner.abort();
    b_runner.abort();
}

#[tokio::test]
async fn unregister_cascades_end_conversation_on_every_remaining_peer() {
    let registry = Arc::new(AgentRegistry::new());
    let hub = HubHandle::new(registry.clone());

    let agent_a = spawn_registered_agent("agent-a", AgentType::Ai, &registry, hub.clone(), Arc::new(NoopHandler));
    let agent_b = spawn_registered_agent("agent-b", AgentType::Ai, &registry, hub.clone(), Arc::new(NoopHandler));
    hub.register_agent(agent_a.clone()).await;
    hub.register_agent(agent_b.clone()).await;

    let a_runner = tokio::spawn(agent_a.clone().run());
    let b_runner = tokio::spawn(agent_b.clone().run());

    agent_b.send_message("agent-a", "hi", MessageType::Text, HashMap::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(agent_a.active_conversation_peers().await, vec!["agent-b".to_string()]);

    hub.unregister_agent("agent-b").await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(
        agent_a.active_conversation_peers().await.is_empty(),
        "unregistering agent-b must clear agent-a's conversation state with it"
    );

    a_runner.abort();
    b_runner.abort();
}
