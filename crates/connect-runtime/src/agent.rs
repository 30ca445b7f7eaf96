// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use connect_core::{Message, MessageType};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::rate_limit::TokenBucket;

const EXIT_SENTINEL: &str = "__EXIT__";

/// Injected by whatever owns routing (the hub) so an agent can send without
/// depending on the hub's crate directly — mirrors the handle/state split
/// used for the hub itself, just turned inside out: the agent is the
/// "state", this trait is its view of the outside world.
#[async_trait]
pub trait OutboundRouter: Send + Sync {
    async fn route(&self, message: Message) -> Result<bool, Error>;
}

/// Domain-specific continuation of the base message pipeline. Concrete
/// agents implement this; everything upstream of it (signature, cooldown,
/// turn-cap, STOP/exit, ack) is handled once, here, for every agent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn process_message(&self, message: &Message) -> Option<Message>;
}

/// No-op handler for agents that only need the base pipeline (useful in
/// tests and for pure echo/relay agents).
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn process_message(&self, _message: &Message) -> Option<Message> {
        None
    }
}

struct ConversationState {
    started_at: Instant,
    turn_count: u32,
}

/// The delivery-side handle the hub holds for an agent: a clone-able sender
/// into the agent's FIFO queue. Holding only this (never the `Agent` itself)
/// keeps the hub from reaching into agent-private state.
#[derive(Clone)]
pub struct AgentHandle {
    pub agent_id: String,
    queue_tx: mpsc::UnboundedSender<Message>,
}

impl AgentHandle {
    pub fn deliver(&self, message: Message) -> Result<(), Error> {
        self.queue_tx
            .send(message)
            .map_err(|_| Error::Communication(format!("agent {} queue closed", self.agent_id)))
    }
}

/// One agent's runtime state: its queue, cooldown, active conversations, and
/// the implicit request/response correlation bookkeeping.
pub struct Agent {
    pub agent_id: String,
    identity: connect_core::AgentIdentity,
    queue_rx: Mutex<mpsc::UnboundedReceiver<Message>>,
    queue_tx: mpsc::UnboundedSender<Message>,
    router: Arc<dyn OutboundRouter>,
    handler: Arc<dyn MessageHandler>,
    is_running: AtomicBool,
    cooldown_until: Mutex<Option<Instant>>,
    active_conversations: Mutex<HashMap<String, ConversationState>>,
    pending_requests: Mutex<HashMap<String, String>>,
    token_bucket: Mutex<TokenBucket>,
    max_turns: u32,
    poll_interval: Duration,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        identity: connect_core::AgentIdentity,
        router: Arc<dyn OutboundRouter>,
        handler: Arc<dyn MessageHandler>,
        max_tokens_per_minute: u32,
        max_tokens_per_hour: u32,
        max_turns: u32,
        poll_interval: Duration,
    ) -> Arc<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Arc::new(Agent {
            agent_id: agent_id.into(),
            identity,
            queue_rx: Mutex::new(queue_rx),
            queue_tx,
            router,
            handler,
            is_running: AtomicBool::new(true),
            cooldown_until: Mutex::new(None),
            active_conversations: Mutex::new(HashMap::new()),
            pending_requests: Mutex::new(HashMap::new()),
            token_bucket: Mutex::new(TokenBucket::new(max_tokens_per_minute, max_tokens_per_hour)),
            max_turns,
            poll_interval,
        })
    }

    pub fn handle(&self) -> AgentHandle {
        AgentHandle {
            agent_id: self.agent_id.clone(),
            queue_tx: self.queue_tx.clone(),
        }
    }

    pub fn deliver(&self, message: Message) -> Result<(), Error> {
        self.queue_tx
            .send(message)
            .map_err(|_| Error::Communication(format!("agent {} queue closed", self.agent_id)))
    }

    pub async fn is_in_cooldown(&self) -> bool {
        match *self.cooldown_until.lock().await {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }

    pub async fn cooldown_remaining(&self) -> Duration {
        match *self.cooldown_until.lock().await {
            Some(until) => until.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    pub async fn set_cooldown(&self, duration: Duration) {
        *self.cooldown_until.lock().await = Some(Instant::now() + duration);
    }

    pub async fn reset_cooldown(&self) {
        *self.cooldown_until.lock().await = None;
    }

    pub async fn can_send_message(&self, _receiver_id: &str) -> bool {
        !self.is_in_cooldown().await
    }

    pub async fn can_receive_message(&self, _sender_id: &str) -> bool {
        !self.is_in_cooldown().await
    }

    pub async fn end_conversation(&self, peer_id: &str) {
        self.active_conversations.lock().await.remove(peer_id);
    }

    /// Peers this agent currently has an open conversation with.
    pub async fn active_conversation_peers(&self) -> Vec<String> {
        self.active_conversations.lock().await.keys().cloned().collect()
    }

    /// Peers that have an outstanding request awaiting a reply from this agent.
    pub async fn pending_request_peers(&self) -> Vec<String> {
        self.pending_requests.lock().await.keys().cloned().collect()
    }

    /// Record token usage against this agent's rate-limit budget; schedules
    /// a cooldown if either window was exceeded.
    pub async fn record_tokens(&self, count: u32) {
        let cooldown = self.token_bucket.lock().await.add_tokens(count);
        if let Some(duration) = cooldown {
            warn!(agent_id = %self.agent_id, ?duration, "rate limit exceeded, entering cooldown");
            self.set_cooldown(duration).await;
        }
    }

    /// Drain the queue, clear all correlation/conversation state, and stop
    /// the processing loop. Safe to call from any task.
    pub async fn stop(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        let mut rx = self.queue_rx.lock().await;
        while rx.try_recv().is_ok() {}
        self.active_conversations.lock().await.clear();
        self.pending_requests.lock().await.clear();
        self.reset_cooldown().await;
    }

    /// Compose, sign, and route a message to `receiver_id`. If a pending
    /// request from that peer exists, tags the outgoing message with
    /// `response_to` and clears the pending entry — the implicit
    /// correlation mechanism.
    pub async fn send_message(
        &self,
        receiver_id: &str,
        content: &str,
        message_type: MessageType,
        mut metadata: HashMap<String, serde_json::Value>,
    ) -> Result<(), Error> {
        if let Some(request_id) = self.pending_requests.lock().await.remove(receiver_id) {
            metadata.insert(
                "response_to".to_string(),
                serde_json::Value::String(request_id),
            );
        }
        let mut message = Message::new(
            self.agent_id.clone(),
            receiver_id,
            content,
            message_type,
            metadata,
        );
        message.sign(&self.identity)?;
        let delivered = self.router.route(message).await?;
        if !delivered {
            return Err(Error::Communication(format!(
                "routing to {receiver_id} failed"
            )));
        }
        Ok(())
    }

    /// Non-blocking processing loop: poll the queue with a short timeout,
    /// spawn a handler task per message, and immediately return to waiting.
    /// Processing one message never blocks dequeuing the next.
    pub async fn run(self: Arc<Self>) {
        info!(agent_id = %self.agent_id, "agent loop starting");
        loop {
            if !self.is_running.load(Ordering::SeqCst) {
                break;
            }
            let next = {
                let mut rx = self.queue_rx.lock().await;
                tokio::time::timeout(self.poll_interval, rx.recv()).await
            };
            match next {
                Ok(Some(message)) => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.handle_one(message).await;
                    });
                }
                Ok(None) => break, // all senders dropped
                Err(_) => continue, // poll timeout, loop again
            }
        }
        info!(agent_id = %self.agent_id, "agent loop stopped");
    }

    /// The shared base pipeline every concrete agent's messages pass
    /// through before domain-specific handling.
    async fn handle_one(&self, message: Message) {
        debug!(agent_id = %self.agent_id, sender = %message.sender_id, msg_type = ?message.message_type, "processing message");

        if self.is_in_cooldown().await {
            let remaining = self.cooldown_remaining().await.as_secs_f64();
            let mut meta = HashMap::new();
            meta.insert(
                "cooldown_remaining".to_string(),
                serde_json::json!(remaining),
            );
            let _ = self
                .send_message(&message.sender_id, "in cooldown", MessageType::Cooldown, meta)
                .await;
            return;
        }

        let peer_id = message.sender_id.clone();
        {
            let mut conversations = self.active_conversations.lock().await;
            let entry = conversations.entry(peer_id.clone()).or_insert_with(|| ConversationState {
                started_at: Instant::now(),
                turn_count: 0,
            });
            entry.turn_count += 1;
            if entry.turn_count > self.max_turns {
                drop(conversations);
                self.end_conversation(&peer_id).await;
                let mut meta = HashMap::new();
                meta.insert(
                    "reason".to_string(),
                    serde_json::Value::String("max_turns_reached".to_string()),
                );
                let _ = self
                    .send_message(&message.sender_id, "max turns reached", MessageType::Stop, meta)
                    .await;
                return;
            }
        }

        if message.message_type == MessageType::Stop || message.content == EXIT_SENTINEL {
            self.end_conversation(&peer_id).await;
            let mut meta = HashMap::new();
            meta.insert(
                "reason".to_string(),
                serde_json::Value::String("conversation_ended".to_string()),
            );
            let _ = self
                .send_message(&message.sender_id, "conversation ended", MessageType::Ignore, meta)
                .await;
            return;
        }

        if message.message_type == MessageType::Cooldown {
            debug!(agent_id = %self.agent_id, peer = %message.sender_id, "acknowledging peer cooldown");
            let mut meta = HashMap::new();
            meta.insert(
                "reason".to_string(),
                serde_json::Value::String("acknowledged_cooldown".to_string()),
            );
            let _ = self
                .send_message(&message.sender_id, "acknowledged cooldown", MessageType::Ignore, meta)
                .await;
            return;
        }

        if let Some(request_id) = message.request_id() {
            self.pending_requests
                .lock()
                .await
                .insert(message.sender_id.clone(), request_id.to_string());
        }

        if let Some(reply) = self.handler.process_message(&message).await {
            let _ = self.router.route(reply).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingRouter {
        sent: Arc<StdMutex<Vec<Message>>>,
    }

    #[async_trait]
    impl OutboundRouter for RecordingRouter {
        async fn route(&self, message: Message) -> Result<bool, Error> {
            self.sent.lock().unwrap().push(message);
            Ok(true)
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn process_message(&self, message: &Message) -> Option<Message> {
            let mut reply = Message::new(
                message.receiver_id.clone(),
                message.sender_id.clone(),
                format!("echo: {}", message.content),
                MessageType::Response,
                HashMap::new(),
            );
            reply.metadata = message.metadata.clone();
            Some(reply)
        }
    }

    fn make_agent(handler: Arc<dyn MessageHandler>) -> (Arc<Agent>, Arc<StdMutex<Vec<Message>>>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let router = Arc::new(RecordingRouter { sent: sent.clone() });
        let identity = connect_core::AgentIdentity::generate_key_based().unwrap();
        let agent = Agent::new(
            "agent-a",
            identity,
            router,
            handler,
            5500,
            100_000,
            20,
            Duration::from_millis(5),
        );
        (agent, sent)
    }

    #[tokio::test]
    async fn delivers_and_echoes_a_message() {
        let (agent, sent) = make_agent(Arc::new(EchoHandler));
        let handle = agent.handle();
        let runner = tokio::spawn(agent.clone().run());

        handle
            .deliver(Message::new("bob", "agent-a", "hi", MessageType::Text, HashMap::new()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        agent.stop().await;
        let _ = tokio::time::timeout(Duration::from_millis(200), runner).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].content, "echo: hi");
    }

    #[tokio::test]
    async fn cooldown_blocks_processing_and_notifies_sender() {
        let (agent, sent) = make_agent(Arc::new(EchoHandler));
        agent.set_cooldown(Duration::from_secs(30)).await;
        let handle = agent.handle();
        let runner = tokio::spawn(agent.clone().run());

        handle
            .deliver(Message::new("bob", "agent-a", "hi", MessageType::Text, HashMap::new()))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        agent.stop().await;
        let _ = tokio::time::timeout(Duration::from_millis(200), runner).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_type, MessageType::Cooldown);
    }

    #[tokio::test]
    async fn exceeding_max_turns_sends_stop() {
        let (agent, sent) = make_agent(Arc::new(EchoHandler));
        // Force a low cap by driving turn_count directly via repeated messages.
        let handle = agent.handle();
        let runner = tokio::spawn(agent.clone().run());
        for _ in 0..25 {
            handle
                .deliver(Message::new("bob", "agent-a", "hi", MessageType::Text, HashMap::new()))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        agent.stop().await;
        let _ = tokio::time::timeout(Duration::from_millis(200), runner).await;

        let sent = sent.lock().unwrap();
        assert!(sent.iter().any(|m| m.message_type == MessageType::Stop));
    }

    #[tokio::test]
    async fn stop_message_ends_conversation_and_emits_ignore() {
        let (agent, sent) = make_agent(Arc::new(EchoHandler));
        agent.handle_one(Message::new("bob", "agent-a", "bye", MessageType::Stop, HashMap::new())).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_type, MessageType::Ignore);
        assert!(!agent.active_conversations.lock().await.contains_key("bob"));
    }

    #[tokio::test]
    async fn peer_cooldown_is_acknowledged_with_ignore() {
        let (agent, sent) = make_agent(Arc::new(EchoHandler));
        agent
            .handle_one(Message::new("bob", "agent-a", "in cooldown", MessageType::Cooldown, HashMap::new()))
            .await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_type, MessageType::Ignore);
    }

    #[tokio::test]
    async fn active_conversation_peers_tracks_open_conversations() {
        let (agent, _sent) = make_agent(Arc::new(EchoHandler));
        agent.handle_one(Message::new("bob", "agent-a", "hi", MessageType::Text, HashMap::new())).await;
        assert_eq!(agent.active_conversation_peers().await, vec!["bob".to_string()]);
        agent.end_conversation("bob").await;
        assert!(agent.active_conversation_peers().await.is_empty());
    }

    #[tokio::test]
    async fn request_id_is_attached_to_next_outbound_message() {
        let (agent, _sent) = make_agent(Arc::new(NoopHandler));
        let mut meta = HashMap::new();
        meta.insert("request_id".to_string(), serde_json::json!("req-1"));
        let msg = Message::new("bob", "agent-a", "ping", MessageType::RequestCollaboration, meta);
        agent.handle_one(msg).await;
        assert_eq!(agent.pending_request_peers().await, vec!["bob".to_string()]);

        agent
            .send_message("bob", "pong", MessageType::CollaborationResponse, HashMap::new())
            .await
            .unwrap();

        let pending = agent.pending_requests.lock().await;
        assert!(pending.get("bob").is_none());
    }
}
