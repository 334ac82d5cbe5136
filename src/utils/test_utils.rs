//! In-memory chat client used by unit tests.

use crate::api::client::{
    ClientError, ComponentInteraction, Interaction, MessageHandle, OutboundMessage,
};
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Every platform call the fake client saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Defer { ephemeral: bool },
    Reply(OutboundMessage),
    EditReply(OutboundMessage),
    FollowUp(OutboundMessage),
    Send(OutboundMessage),
    Edit { id: String, message: OutboundMessage },
    Acknowledge { custom_id: String, user_id: String },
}

impl Call {
    pub fn message(&self) -> Option<&OutboundMessage> {
        match self {
            Call::Reply(message)
            | Call::EditReply(message)
            | Call::FollowUp(message)
            | Call::Send(message)
            | Call::Edit { message, .. } => Some(message),
            Call::Defer { .. } | Call::Acknowledge { .. } => None,
        }
    }
}

type ClickSender = mpsc::UnboundedSender<Arc<dyn ComponentInteraction>>;

#[derive(Default)]
struct ClientState {
    calls: Vec<Call>,
    /// Component ids per message id, as last sent.
    components: HashMap<String, Vec<String>>,
    listeners: HashMap<String, Vec<ClickSender>>,
    /// Messages removed on the platform side; edits to them fail.
    deleted: HashSet<String>,
}

/// Shared state behind [`FakeInteraction`] and the handles it returns.
#[derive(Default)]
pub struct FakeClient {
    state: Mutex<ClientState>,
    next_message: AtomicU64,
    acknowledged: AtomicBool,
    /// Fails the next N message-producing calls with a transport error.
    failures: AtomicUsize,
}

impl FakeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn interaction(self: &Arc<Self>, user_id: &str) -> Arc<FakeInteraction> {
        Arc::new(FakeInteraction {
            client: self.clone(),
            user_id: user_id.to_string(),
            guild_id: Some("guild-1".to_string()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Payload-carrying calls only.
    pub fn messages(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| call.message().is_some())
            .collect()
    }

    pub fn acknowledgements(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Acknowledge { .. }))
            .count()
    }

    pub fn last_message(&self) -> Option<OutboundMessage> {
        self.calls()
            .iter()
            .rev()
            .find_map(|call| call.message().cloned())
    }

    pub fn component_ids(&self, message_id: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .components
            .get(message_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has_listener(&self, message_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .listeners
            .get(message_id)
            .is_some_and(|senders| !senders.is_empty())
    }

    /// Marks the interaction as answered by someone else.
    pub fn mark_acknowledged(&self) {
        self.acknowledged.store(true, Ordering::SeqCst);
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delivers a component interaction to every listener on `message_id`.
    pub fn click(self: &Arc<Self>, message_id: &str, custom_id: &str, user_id: &str, values: &[&str]) {
        let event: Arc<dyn ComponentInteraction> = Arc::new(FakeComponent {
            client: self.clone(),
            custom_id: custom_id.to_string(),
            user_id: user_id.to_string(),
            values: values.iter().map(|value| value.to_string()).collect(),
        });
        let state = self.state.lock().unwrap();
        for sender in state.listeners.get(message_id).into_iter().flatten() {
            let _ = sender.send(event.clone());
        }
    }

    /// Simulates a user or moderator deleting a sent message.
    pub fn delete_message(&self, message_id: &str) {
        self.state
            .lock()
            .unwrap()
            .deleted
            .insert(message_id.to_string());
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn produce(
        self: &Arc<Self>,
        id: Option<String>,
        call: Call,
    ) -> Result<Arc<dyn MessageHandle>, ClientError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ClientError::Transport("injected failure".into()));
        }
        if let Some(id) = &id {
            if self.state.lock().unwrap().deleted.contains(id) {
                return Err(ClientError::UnknownMessage(id.clone()));
            }
        }
        let id = id.unwrap_or_else(|| {
            format!("msg-{}", self.next_message.fetch_add(1, Ordering::SeqCst) + 1)
        });
        let ids = call
            .message()
            .map(|message| {
                message
                    .page
                    .components
                    .iter()
                    .flat_map(|component| component.custom_ids())
                    .collect()
            })
            .unwrap_or_default();
        {
            let mut state = self.state.lock().unwrap();
            state.components.insert(id.clone(), ids);
            state.calls.push(call);
        }
        Ok(Arc::new(FakeMessage {
            client: self.clone(),
            id,
        }))
    }
}

pub struct FakeInteraction {
    client: Arc<FakeClient>,
    user_id: String,
    guild_id: Option<String>,
}

#[async_trait::async_trait]
impl Interaction for FakeInteraction {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn guild_id(&self) -> Option<&str> {
        self.guild_id.as_deref()
    }

    fn is_acknowledged(&self) -> bool {
        self.client.acknowledged.load(Ordering::SeqCst)
    }

    async fn defer_reply(&self, ephemeral: bool) -> Result<(), ClientError> {
        if self.client.acknowledged.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyAcknowledged);
        }
        self.client.record(Call::Defer { ephemeral });
        Ok(())
    }

    async fn reply(&self, message: &OutboundMessage) -> Result<Arc<dyn MessageHandle>, ClientError> {
        if self.client.acknowledged.load(Ordering::SeqCst) {
            return Err(ClientError::AlreadyAcknowledged);
        }
        let handle = self.client.produce(None, Call::Reply(message.clone()))?;
        self.client.acknowledged.store(true, Ordering::SeqCst);
        Ok(handle)
    }

    async fn edit_reply(
        &self,
        message: &OutboundMessage,
    ) -> Result<Arc<dyn MessageHandle>, ClientError> {
        self.client.produce(None, Call::EditReply(message.clone()))
    }

    async fn follow_up(
        &self,
        message: &OutboundMessage,
    ) -> Result<Arc<dyn MessageHandle>, ClientError> {
        self.client.produce(None, Call::FollowUp(message.clone()))
    }

    async fn send(&self, message: &OutboundMessage) -> Result<Arc<dyn MessageHandle>, ClientError> {
        self.client.produce(None, Call::Send(message.clone()))
    }
}

pub struct FakeMessage {
    client: Arc<FakeClient>,
    id: String,
}

#[async_trait::async_trait]
impl MessageHandle for FakeMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_ids(&self) -> Vec<String> {
        self.client.component_ids(&self.id)
    }

    async fn edit(&self, message: &OutboundMessage) -> Result<Arc<dyn MessageHandle>, ClientError> {
        self.client.produce(
            Some(self.id.clone()),
            Call::Edit {
                id: self.id.clone(),
                message: message.clone(),
            },
        )
    }

    fn collect_components(&self) -> BoxStream<'static, Arc<dyn ComponentInteraction>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.client
            .state
            .lock()
            .unwrap()
            .listeners
            .entry(self.id.clone())
            .or_default()
            .push(tx);
        futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
        .boxed()
    }
}

struct FakeComponent {
    client: Arc<FakeClient>,
    custom_id: String,
    user_id: String,
    values: Vec<String>,
}

#[async_trait::async_trait]
impl ComponentInteraction for FakeComponent {
    fn custom_id(&self) -> &str {
        &self.custom_id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn guild_id(&self) -> Option<&str> {
        Some("guild-1")
    }

    fn values(&self) -> &[String] {
        &self.values
    }

    async fn acknowledge(&self) -> Result<(), ClientError> {
        self.client.record(Call::Acknowledge {
            custom_id: self.custom_id.clone(),
            user_id: self.user_id.clone(),
        });
        Ok(())
    }
}

/// Polls `condition` until it holds, yielding to spawned tasks in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
