//! Contracts for the chat platform client.
//!
//! The gateway, HTTP transport and command registration live outside this
//! crate. A bot hands each render root an [`Interaction`]; the dispatcher
//! drives it and the [`MessageHandle`]s it returns.

use crate::api::{Attachment, Page};
use futures_util::stream::BoxStream;
use std::fmt;
use std::sync::Arc;

/// Failures reported by the chat client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The interaction was already replied to or deferred.
    AlreadyAcknowledged,
    /// The target message no longer exists.
    UnknownMessage(String),
    /// The platform refused the payload.
    Rejected { status: u16, message: String },
    /// Network or gateway failure.
    Transport(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::AlreadyAcknowledged => write!(f, "interaction already acknowledged"),
            ClientError::UnknownMessage(id) => write!(f, "unknown message {id}"),
            ClientError::Rejected { status, message } => {
                write!(f, "payload rejected ({status}): {message}")
            }
            ClientError::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// A page ready to send, with uploads split from files the message already carries.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub page: Page,
    /// Files that must be uploaded with this call.
    pub uploads: Vec<Attachment>,
    /// Names of files already attached to the target message that should be kept.
    pub retained: Vec<String>,
}

impl OutboundMessage {
    pub fn new(page: Page) -> Self {
        let uploads = page.files.clone();
        Self {
            page,
            uploads,
            retained: Vec::new(),
        }
    }
}

/// The command invocation a render root answers.
#[async_trait::async_trait]
pub trait Interaction: Send + Sync {
    fn user_id(&self) -> &str;

    fn guild_id(&self) -> Option<&str>;

    /// Whether something other than this root already replied or deferred.
    fn is_acknowledged(&self) -> bool;

    async fn defer_reply(&self, ephemeral: bool) -> Result<(), ClientError>;

    async fn reply(&self, message: &OutboundMessage)
        -> Result<Arc<dyn MessageHandle>, ClientError>;

    async fn edit_reply(
        &self,
        message: &OutboundMessage,
    ) -> Result<Arc<dyn MessageHandle>, ClientError>;

    async fn follow_up(
        &self,
        message: &OutboundMessage,
    ) -> Result<Arc<dyn MessageHandle>, ClientError>;

    /// Posts a plain channel message, used when the reply slot is taken.
    async fn send(&self, message: &OutboundMessage)
        -> Result<Arc<dyn MessageHandle>, ClientError>;
}

/// A message this root created.
#[async_trait::async_trait]
pub trait MessageHandle: Send + Sync {
    fn id(&self) -> &str;

    /// Custom ids of the interactive components the message currently carries.
    fn component_ids(&self) -> Vec<String>;

    /// Edits the message and returns the refreshed handle.
    async fn edit(&self, message: &OutboundMessage)
        -> Result<Arc<dyn MessageHandle>, ClientError>;

    /// Stream of component interactions scoped to this message.
    fn collect_components(&self) -> BoxStream<'static, Arc<dyn ComponentInteraction>>;
}

/// One click or selection on a message component.
#[async_trait::async_trait]
pub trait ComponentInteraction: Send + Sync {
    fn custom_id(&self) -> &str;

    fn user_id(&self) -> &str;

    fn guild_id(&self) -> Option<&str>;

    /// Selected values; empty for buttons.
    fn values(&self) -> &[String];

    /// Acknowledges without sending anything (a deferred update).
    async fn acknowledge(&self) -> Result<(), ClientError>;
}

/// What a component callback receives.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentEvent {
    pub custom_id: String,
    pub user_id: String,
    pub guild_id: Option<String>,
    pub values: Vec<String>,
}

impl ComponentEvent {
    pub fn from_interaction(interaction: &dyn ComponentInteraction) -> Self {
        Self {
            custom_id: interaction.custom_id().to_string(),
            user_id: interaction.user_id().to_string(),
            guild_id: interaction.guild_id().map(str::to_string),
            values: interaction.values().to_vec(),
        }
    }
}
