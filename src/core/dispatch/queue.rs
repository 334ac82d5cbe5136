//! The per-root dispatch queue.
//!
//! Every commit enqueues one task. A single worker takes tasks in order and
//! awaits each platform call before moving on, so edits to the same message
//! never race and the latest committed state is always the last one sent.

use super::rehydrate::{rehydrate, EventRouter};
use super::segment::compute_pages;
use crate::api::client::{ClientError, Interaction, MessageHandle, OutboundMessage};
use crate::api::Page;
use crate::core::render::RenderRequester;
use crate::core::tree::{Container, TreeError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug)]
pub enum DispatchError {
    Tree(TreeError),
    Client { index: usize, source: ClientError },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Tree(err) => write!(f, "could not serialize tree: {err}"),
            DispatchError::Client { index, source } => {
                write!(f, "sending page {index} failed: {source}")
            }
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::Tree(err) => Some(err),
            DispatchError::Client { source, .. } => Some(source),
        }
    }
}

impl From<TreeError> for DispatchError {
    fn from(err: TreeError) -> Self {
        DispatchError::Tree(err)
    }
}

/// Enqueues dispatch tasks for a root.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl DispatchHandle {
    pub fn new(tx: mpsc::UnboundedSender<()>) -> Self {
        Self { tx }
    }

    pub fn notify(&self) {
        if self.tx.send(()).is_err() {
            debug!("dispatch queue closed; dropping task");
        }
    }
}

/// What the worker keeps between tasks.
pub struct Dispatcher {
    interaction: Arc<dyn Interaction>,
    container: Arc<Mutex<Container>>,
    router: EventRouter,
    ready: watch::Sender<bool>,
    /// Last payload successfully sent at each index.
    sent: Vec<Page>,
    messages: Vec<Arc<dyn MessageHandle>>,
    deferred: bool,
    listening: HashSet<String>,
}

fn put<T>(items: &mut Vec<T>, index: usize, item: T) {
    if index < items.len() {
        items[index] = item;
    } else {
        items.push(item);
    }
}

impl Dispatcher {
    pub(crate) fn new(
        interaction: Arc<dyn Interaction>,
        container: Arc<Mutex<Container>>,
        requester: RenderRequester,
        ready: watch::Sender<bool>,
    ) -> Self {
        Self {
            router: EventRouter::new(container.clone(), requester),
            interaction,
            container,
            ready,
            sent: Vec::new(),
            messages: Vec::new(),
            deferred: false,
            listening: HashSet::new(),
        }
    }

    pub(crate) fn spawn(mut self, mut tasks: mpsc::UnboundedReceiver<()>, cancel: CancellationToken) {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    task = tasks.recv() => {
                        if task.is_none() {
                            break;
                        }
                        self.run_task(&cancel).await;
                    }
                }
            }
            debug!("dispatch queue stopped");
        });
    }

    /// One task: send what changed, release waiters, then rebind callbacks.
    /// Failures are logged and never stop the queue.
    async fn run_task(&mut self, cancel: &CancellationToken) {
        if let Err(err) = self.dispatch().await {
            warn!(error = %err, "dispatch task failed");
        }
        self.ready.send_replace(true);
        rehydrate(&self.router, &self.messages, &mut self.listening, cancel).await;
    }

    pub(crate) async fn dispatch(&mut self) -> Result<(), DispatchError> {
        let mut pages = {
            let container = self.container.lock().await;
            compute_pages(container.tree())?
        };

        if pages.is_empty() {
            if self.messages.is_empty() {
                if !self.deferred {
                    self.acknowledge().await;
                }
                return Ok(());
            }
            // Nothing left to show: clear the first message instead of leaving it stale.
            pages.push(Page::default());
        }

        let mut failure = None;
        for (index, page) in pages.iter().enumerate() {
            if let Err(err) = self.dispatch_page(index, page).await {
                warn!(index, error = %err, "page dispatch failed");
                let sent = index < self.messages.len();
                failure.get_or_insert(err);
                if !sent {
                    // Later pages must not overtake one that was never sent.
                    break;
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Defers the reply; a late or duplicate acknowledge is not an error.
    async fn acknowledge(&mut self) {
        match self.interaction.defer_reply(false).await {
            Ok(()) => {
                debug!("interaction deferred");
                self.deferred = true;
            }
            Err(err) => debug!(error = %err, "defer failed; ignoring"),
        }
    }

    async fn dispatch_page(&mut self, index: usize, page: &Page) -> Result<(), DispatchError> {
        if self.sent.get(index) == Some(page) {
            debug!(index, "page unchanged; skipping");
            return Ok(());
        }

        let message = self.outbound(index, page).await;
        let existing = self.messages.get(index).cloned();
        let result = match existing {
            Some(handle) => {
                debug!(index, message = handle.id(), "editing page");
                match handle.edit(&message).await {
                    Err(ClientError::UnknownMessage(id)) => {
                        debug!(index, message = %id, "message is gone; sending a replacement");
                        self.replace(index, &OutboundMessage::new(page.clone())).await
                    }
                    other => other,
                }
            }
            None if index == 0 => {
                if self.deferred {
                    debug!("editing deferred reply");
                    self.interaction.edit_reply(&message).await
                } else if self.interaction.is_acknowledged() {
                    debug!("interaction already answered; sending a new message");
                    self.interaction.send(&message).await
                } else {
                    debug!("replying");
                    self.interaction.reply(&message).await
                }
            }
            None => {
                debug!(index, "sending follow-up");
                self.interaction.follow_up(&message).await
            }
        };
        let handle = result.map_err(|source| DispatchError::Client { index, source })?;

        self.container
            .lock()
            .await
            .record_attachments(index, &page.files);
        put(&mut self.messages, index, handle);
        put(&mut self.sent, index, page.clone());
        Ok(())
    }

    /// Sends a fresh message for a page whose message was deleted.
    async fn replace(
        &self,
        index: usize,
        message: &OutboundMessage,
    ) -> Result<Arc<dyn MessageHandle>, ClientError> {
        if index == 0 {
            self.interaction.send(message).await
        } else {
            self.interaction.follow_up(message).await
        }
    }

    /// Splits the page's files into fresh uploads and ones the message at
    /// `index` already carries unchanged.
    async fn outbound(&self, index: usize, page: &Page) -> OutboundMessage {
        let mut message = OutboundMessage::new(page.clone());
        if index >= self.messages.len() {
            return message;
        }
        let container = self.container.lock().await;
        let (retained, uploads): (Vec<_>, Vec<_>) = message
            .uploads
            .into_iter()
            .partition(|attachment| container.has_attachment(index, attachment));
        message.uploads = uploads;
        message.retained = retained.into_iter().map(|attachment| attachment.name).collect();
        message
    }
}
