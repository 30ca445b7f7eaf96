// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use connect_core::{CollaborationProtocol, Message, MessageType, Protocol};
use connect_index::{AgentRegistry, AgentType, InteractionMode};
use connect_runtime::{Agent, OutboundRouter};
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::debug;

use crate::error::Error;
use crate::handler::Handler;

const MAX_CHAIN_LENGTH: usize = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const MAX_TIMEOUT_SECS: u64 = 300;
const LATE_RESPONSE_GRACE_SECS: u64 = 60;

enum PendingSlot {
    Waiting(oneshot::Sender<Message>),
    TimedOut,
}

/// Outcome of [`Hub::check_collaboration_result`].
pub enum CollaborationResult {
    Completed(Message),
    CompletedLate(Message),
    Pending,
    NotFound,
}

/// Owning state of the communication hub: the agent directory, message
/// history, handler lists, and the request/response correlation maps.
/// Mirrors the upstream hub's `active_agents` / `pending_responses` /
/// `late_responses` fields.
pub struct Hub {
    registry: Arc<AgentRegistry>,
    active_agents: RwLock<HashMap<String, Arc<Agent>>>,
    global_handlers: Mutex<Vec<Arc<dyn Handler>>>,
    per_agent_handlers: Mutex<HashMap<String, Vec<Arc<dyn Handler>>>>,
    history: Mutex<Vec<Message>>,
    pending_responses: Mutex<HashMap<String, PendingSlot>>,
    late_responses: Mutex<HashMap<String, Message>>,
}

impl Hub {
    fn new(registry: Arc<AgentRegistry>) -> Self {
        Hub {
            registry,
            active_agents: RwLock::new(HashMap::new()),
            global_handlers: Mutex::new(Vec::new()),
            per_agent_handlers: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            pending_responses: Mutex::new(HashMap::new()),
            late_responses: Mutex::new(HashMap::new()),
        }
    }

    async fn record(&self, message: &Message) {
        self.history.lock().await.push(message.clone());
    }

    async fn notify_handlers(&self, message: &Message) {
        for handler in self.global_handlers.lock().await.iter() {
            handler.on_message(message).await;
        }
        let per_agent = self.per_agent_handlers.lock().await;
        if let Some(handlers) = per_agent.get(&message.receiver_id) {
            for handler in handlers {
                handler.on_message(message).await;
            }
        }
        if message.message_type.is_special() {
            if let Some(handlers) = per_agent.get(&message.sender_id) {
                for handler in handlers {
                    handler.on_message(message).await;
                }
            }
        }
    }

    /// The 13-step routing contract: SYSTEM fast-path, self-send rejection,
    /// presence checks, COOLDOWN/STOP delivery, collaboration-response
    /// correlation, identity/signature verification, and finally history +
    /// delivery + handler fan-out.
    async fn route_message(&self, message: Message) -> Result<bool, Error> {
        if message.message_type == MessageType::System {
            self.record(&message).await;
            self.notify_handlers(&message).await;
            return Ok(true);
        }

        if message.sender_id == message.receiver_id {
            return Ok(false);
        }

        let agents = self.active_agents.read().await;
        let Some(receiver) = agents.get(&message.receiver_id).cloned() else {
            return Ok(false);
        };
        let sender_present = agents.contains_key(&message.sender_id);
        drop(agents);
        if !sender_present {
            return Ok(false);
        }

        if message.message_type == MessageType::Stop {
            self.record(&message).await;
            self.notify_handlers(&message).await;
            let _ = receiver.deliver(message);
            return Ok(true);
        }

        if message.message_type == MessageType::Cooldown {
            self.record(&message).await;
            self.notify_handlers(&message).await;
            let receiver_is_human = self.registry.get_agent_type(&message.receiver_id) == Some(AgentType::Human);
            if receiver_is_human {
                let _ = receiver.deliver(message);
            }
            return Ok(true);
        }

        if message.message_type == MessageType::CollaborationResponse {
            if let Some(request_id) = message.response_to() {
                self.resolve_pending(request_id, &message).await;
            }
            self.notify_handlers(&message).await;
            return Ok(true);
        }

        let sender_registration = self.registry.get_registration(&message.sender_id);
        let receiver_registration = self.registry.get_registration(&message.receiver_id);

        if let (Some(sender_reg), Some(_receiver_reg)) = (&sender_registration, &receiver_registration) {
            let verified = message
                .verify(&sender_reg.identity)
                .map_err(|e| Error::Security(e.to_string()))?;
            if !verified {
                return Err(Error::Security(format!(
                    "signature verification failed for message from {}",
                    message.sender_id
                )));
            }
        }

        if let (Some(sender_reg), Some(receiver_reg)) = (&sender_registration, &receiver_registration) {
            let compatible = sender_reg
                .interaction_modes
                .iter()
                .any(|m| receiver_reg.interaction_modes.contains(m));
            if !compatible {
                return Ok(false);
            }

            let both_agent_to_agent = sender_reg.interaction_modes.contains(&InteractionMode::AgentToAgent)
                && receiver_reg.interaction_modes.contains(&InteractionMode::AgentToAgent);
            if both_agent_to_agent && !CollaborationProtocol::default().supports(message.message_type) {
                return Err(Error::Communication(format!(
                    "message type {:?} is not carried by the collaboration protocol",
                    message.message_type
                )));
            }
        }

        let mut message = message;
        if message.message_type == MessageType::RequestCollaboration {
            let mut chain = message.collaboration_chain();
            if chain.is_empty() {
                chain.push(message.sender_id.clone());
                message.metadata.insert(
                    "collaboration_chain".to_string(),
                    serde_json::json!(chain),
                );
            }
            if !message.metadata.contains_key("original_sender") {
                message.metadata.insert(
                    "original_sender".to_string(),
                    serde_json::Value::String(message.sender_id.clone()),
                );
            }
        }

        self.record(&message).await;
        let receiver_for_delivery = receiver.clone();
        let to_deliver = message.clone();
        tokio::spawn(async move {
            let _ = receiver_for_delivery.deliver(to_deliver);
        });
        self.notify_handlers(&message).await;
        Ok(true)
    }

    async fn resolve_pending(&self, request_id: &str, message: &Message) {
        let mut pending = self.pending_responses.lock().await;
        match pending.remove(request_id) {
            Some(PendingSlot::Waiting(tx)) => {
                let _ = tx.send(message.clone());
            }
            Some(PendingSlot::TimedOut) => {
                debug!(%request_id, "late collaboration response received");
                self.late_responses
                    .lock()
                    .await
                    .insert(request_id.to_string(), message.clone());
            }
            None => {}
        }
    }

    async fn register_agent(&self, agent: Arc<Agent>) {
        self.active_agents
            .write()
            .await
            .insert(agent.agent_id.clone(), agent);
    }

    async fn unregister_agent(&self, agent_id: &str) {
        self.active_agents.write().await.remove(agent_id);
        self.per_agent_handlers.lock().await.remove(agent_id);
        let agents: Vec<Arc<Agent>> = self.active_agents.read().await.values().cloned().collect();
        for other in agents {
            other.end_conversation(agent_id).await;
        }
    }

    async fn register_global_handler(&self, handler: Arc<dyn Handler>) {
        self.global_handlers.lock().await.push(handler);
    }

    async fn register_agent_handler(&self, agent_id: &str, handler: Arc<dyn Handler>) {
        self.per_agent_handlers
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .push(handler);
    }

    /// Dispatch `message`, park a future keyed by its `request_id`, and wait
    /// up to `timeout` for a matching COLLABORATION_RESPONSE. On timeout,
    /// marks the slot so a late reply is still captured, and schedules
    /// cleanup after the grace window.
    async fn send_message_and_wait_response(
        &self,
        mut message: Message,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        let request_id = message
            .request_id()
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        message
            .metadata
            .insert("request_id".to_string(), serde_json::Value::String(request_id.clone()));

        let (tx, rx) = oneshot::channel();
        self.pending_responses
            .lock()
            .await
            .insert(request_id.clone(), PendingSlot::Waiting(tx));

        let delivered = self.route_message(message).await?;
        if !delivered {
            self.pending_responses.lock().await.remove(&request_id);
            return Ok(None);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(Some(response)),
            _ => {
                if let Some(slot) = self.pending_responses.lock().await.get_mut(&request_id) {
                    *slot = PendingSlot::TimedOut;
                }
                // Grace-window cleanup is scheduled by the caller (`HubHandle`),
                // which owns the `Arc<Hub>` needed to spawn a detached task.
                Ok(None)
            }
        }
    }

    async fn check_collaboration_result(&self, request_id: &str) -> CollaborationResult {
        if let Some(message) = self.late_responses.lock().await.remove(request_id) {
            return CollaborationResult::CompletedLate(message);
        }
        match self.pending_responses.lock().await.get(request_id) {
            Some(PendingSlot::Waiting(_)) | Some(PendingSlot::TimedOut) => CollaborationResult::Pending,
            None => CollaborationResult::NotFound,
        }
    }
}

/// Cheaply clone-able external view of the hub. All hub mutation goes
/// through this handle so callers never see the lock internals.
#[derive(Clone)]
pub struct HubHandle(Arc<Hub>);

impl HubHandle {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        HubHandle(Arc::new(Hub::new(registry)))
    }

    pub async fn register_agent(&self, agent: Arc<Agent>) {
        self.0.register_agent(agent).await;
    }

    pub async fn unregister_agent(&self, agent_id: &str) {
        self.0.unregister_agent(agent_id).await;
    }

    pub async fn register_global_handler(&self, handler: Arc<dyn Handler>) {
        self.0.register_global_handler(handler).await;
    }

    pub async fn register_agent_handler(&self, agent_id: &str, handler: Arc<dyn Handler>) {
        self.0.register_agent_handler(agent_id, handler).await;
    }

    pub async fn route_message(&self, message: Message) -> Result<bool, Error> {
        self.0.route_message(message).await
    }

    pub async fn send_message_and_wait_response(
        &self,
        message: Message,
        timeout: Duration,
    ) -> Result<Option<Message>, Error> {
        let request_id = message.request_id().map(str::to_string);
        let result = self.0.send_message_and_wait_response(message, timeout).await;
        if matches!(result, Ok(None)) {
            if let Some(request_id) = request_id {
                let hub = self.0.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(LATE_RESPONSE_GRACE_SECS)).await;
                    hub.pending_responses.lock().await.remove(&request_id);
                });
            }
        }
        result
    }

    /// Delegate collaboration: enforces chain hygiene (no loop back to the
    /// original sender, no self-delegation, max hop count), picks an
    /// adaptive timeout scaled by task length, and waits for the response.
    ///
    /// `incoming` is the request currently being handled when this call is
    /// itself a further hop in a delegation chain (carries the chain so far
    /// and the original sender forward); `None` starts a fresh chain.
    pub async fn send_collaboration_request(
        &self,
        sender: &Arc<Agent>,
        receiver_id: &str,
        task: &str,
        explicit_timeout: Option<Duration>,
        incoming: Option<&Message>,
    ) -> Result<String, Error> {
        if sender.agent_id == receiver_id {
            return Err(Error::Chain("cannot delegate to self".to_string()));
        }

        let mut chain = incoming.map(|m| m.collaboration_chain()).unwrap_or_default();
        let original_sender = incoming
            .and_then(|m| m.metadata.get("original_sender"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| sender.agent_id.clone());

        validate_chain(&chain, receiver_id, &original_sender)?;
        chain.push(sender.agent_id.clone());

        let request_id = uuid::Uuid::new_v4().to_string();
        let mut metadata = HashMap::new();
        metadata.insert(
            "request_id".to_string(),
            serde_json::Value::String(request_id.clone()),
        );
        metadata.insert("collaboration_chain".to_string(), serde_json::json!(chain));
        metadata.insert(
            "original_sender".to_string(),
            serde_json::Value::String(original_sender),
        );

        let message = Message::new(
            sender.agent_id.clone(),
            receiver_id,
            task,
            MessageType::RequestCollaboration,
            metadata,
        );

        let timeout = explicit_timeout.unwrap_or_else(|| adaptive_timeout(task));

        match self.0.send_message_and_wait_response(message, timeout).await? {
            Some(response) => Ok(response.content),
            None => Ok(format!(
                "collaboration request {request_id} to {receiver_id} timed out after {}s",
                timeout.as_secs()
            )),
        }
    }

    pub async fn check_collaboration_result(&self, request_id: &str) -> CollaborationResult {
        self.0.check_collaboration_result(request_id).await
    }

    pub async fn history(&self) -> Vec<Message> {
        self.0.history.lock().await.clone()
    }
}

/// Adaptive timeout: `min(60 + (len(task)/100)*15, 300)` seconds.
fn adaptive_timeout(task: &str) -> Duration {
    let scaled = DEFAULT_TIMEOUT_SECS + (task.len() as u64 / 100) * 15;
    Duration::from_secs(scaled.min(MAX_TIMEOUT_SECS))
}

fn validate_chain(chain: &[String], receiver_id: &str, original_sender: &str) -> Result<(), Error> {
    if chain.len() >= MAX_CHAIN_LENGTH {
        return Err(Error::Chain(format!(
            "collaboration chain exceeds max length of {MAX_CHAIN_LENGTH}"
        )));
    }
    if receiver_id == original_sender {
        return Err(Error::Chain(format!(
            "collaboration chain would loop back to original sender {original_sender}"
        )));
    }
    Ok(())
}

#[async_trait]
impl OutboundRouter for HubHandle {
    async fn route(&self, message: Message) -> std::result::Result<bool, connect_runtime::Error> {
        self.0
            .route_message(message)
            .await
            .map_err(|e| connect_runtime::Error::Communication(e.to_string()))
    }
}
