// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0

//! Minimal demo binary: wires the registry, capability index, hub, and a
//! pair of in-process agents, then drives a signed text exchange and a
//! collaboration request/response round-trip end to end.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use connect_core::{AgentIdentity, Message, MessageType};
use connect_hub::HubHandle;
use connect_index::{AgentRegistration, AgentRegistry, AgentType, CapabilityIndex, Capability, InteractionMode};
use connect_runtime::{Agent, MessageHandler};
use tracing::info;

#[derive(Parser)]
#[command(name = "connect-demo", version, about = "Decentralized agent messaging substrate demo")]
struct Cli {
    /// Path to an additional TOML config file, merged over the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the effective configuration as JSON and exit.
    Config,
    /// Run the in-process demo: register two agents, exchange a signed
    /// message, and perform one collaboration round-trip.
    Run,
}

/// Echoes text messages back to the sender, prefixed, and answers
/// collaboration requests with a canned response.
struct DemoHandler {
    agent_id: String,
}

#[async_trait]
impl MessageHandler for DemoHandler {
    async fn process_message(&self, message: &Message) -> Option<Message> {
        match message.message_type {
            MessageType::Text => {
                let mut reply = Message::new(
                    self.agent_id.clone(),
                    message.sender_id.clone(),
                    format!("{} heard: {}", self.agent_id, message.content),
                    MessageType::Response,
                    HashMap::new(),
                );
                reply.metadata = message.metadata.clone();
                Some(reply)
            }
            MessageType::RequestCollaboration => {
                let mut meta = HashMap::new();
                if let Some(request_id) = message.request_id() {
                    meta.insert(
                        "response_to".to_string(),
                        serde_json::Value::String(request_id.to_string()),
                    );
                }
                Some(Message::new(
                    self.agent_id.clone(),
                    message.sender_id.clone(),
                    format!("{} completed: {}", self.agent_id, message.content),
                    MessageType::CollaborationResponse,
                    meta,
                ))
            }
            _ => None,
        }
    }
}

fn registration(agent_id: &str, identity: AgentIdentity, capability: &str) -> AgentRegistration {
    AgentRegistration {
        agent_id: agent_id.to_string(),
        organization_id: None,
        agent_type: AgentType::Ai,
        interaction_modes: vec![InteractionMode::AgentToAgent],
        capabilities: vec![Capability {
            name: capability.to_string(),
            description: format!("demo capability provided by {agent_id}"),
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

async fn run_demo(config: connect_config::Config) -> anyhow::Result<()> {
    let registry = Arc::new(AgentRegistry::new());
    let index = Arc::new(CapabilityIndex::new());
    let hub = HubHandle::new(registry.clone());

    let poll_interval = Duration::from_millis(config.runtime.queue_poll_interval_ms);

    let alice_identity = AgentIdentity::generate_key_based()?;
    let bob_identity = AgentIdentity::generate_key_based()?;

    registry.register(registration("alice", alice_identity.clone(), "summarize"))?;
    registry.register(registration("bob", bob_identity.clone(), "translate"))?;
    index.add(&registry.get_registration("alice").unwrap());
    index.add(&registry.get_registration("bob").unwrap());

    let alice = Agent::new(
        "alice",
        alice_identity,
        Arc::new(hub.clone()),
        Arc::new(DemoHandler { agent_id: "alice".to_string() }),
        config.runtime.max_tokens_per_minute,
        config.runtime.max_tokens_per_hour,
        config.runtime.max_turns,
        poll_interval,
    );
    let bob = Agent::new(
        "bob",
        bob_identity,
        Arc::new(hub.clone()),
        Arc::new(DemoHandler { agent_id: "bob".to_string() }),
        config.runtime.max_tokens_per_minute,
        config.runtime.max_tokens_per_hour,
        config.runtime.max_turns,
        poll_interval,
    );

    hub.register_agent(alice.clone()).await;
    hub.register_agent(bob.clone()).await;

    let alice_runner = tokio::spawn(alice.clone().run());
    let bob_runner = tokio::spawn(bob.clone().run());

    alice
        .send_message("bob", "hello from alice", MessageType::Text, HashMap::new())
        .await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let found = index.find_semantic("translate", 5, config.index.similarity_threshold);
    info!(matches = found.len(), "capability search for 'translate'");

    let response = hub
        .send_collaboration_request(&alice, "bob", "translate this phrase", None, None)
        .await?;
    info!(%response, "collaboration round-trip complete");

    alice.stop().await;
    bob.stop().await;
    hub.unregister_agent("alice").await;
    hub.unregister_agent("bob").await;
    let _ = tokio::time::timeout(Duration::from_millis(200), alice_runner).await;
    let _ = tokio::time::timeout(Duration::from_millis(200), bob_runner).await;

    for message in hub.history().await {
        info!(from = %message.sender_id, to = %message.receiver_id, content = %message.content, "history entry");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = connect_config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Run => {
            run_demo(config).await?;
        }
    }

    Ok(())
}
