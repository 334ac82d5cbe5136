//! Re-binding live callbacks to the components of sent messages.

use crate::api::client::{ComponentEvent, ComponentInteraction, MessageHandle};
use crate::core::render::RenderRequester;
use crate::core::tree::props::keys;
use crate::core::tree::{Container, Handler, Node, NodeKind, PropsExt, Tree};
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An interactive node found by custom id, with what it takes to invoke it.
#[derive(Debug, Clone)]
pub struct InteractiveMatch {
    pub kind: NodeKind,
    pub handler: Option<Handler>,
    /// `(value, callback)` for every option of a select that has one.
    pub options: Vec<(String, Handler)>,
    /// Users allowed to invoke it; `None` means everyone.
    pub whitelist: Option<Vec<String>>,
}

impl InteractiveMatch {
    pub fn permits(&self, user_id: &str) -> bool {
        self.whitelist
            .as_ref()
            .is_none_or(|users| users.iter().any(|user| user == user_id))
    }
}

fn narrow(whitelist: Option<&Vec<String>>, users: &[String]) -> Vec<String> {
    match whitelist {
        Some(outer) => users
            .iter()
            .filter(|user| outer.contains(user))
            .cloned()
            .collect(),
        None => users.to_vec(),
    }
}

fn matched(node: &Node, tree: &Tree, whitelist: Option<Vec<String>>) -> InteractiveMatch {
    let (handler, options) = match node.kind() {
        NodeKind::Select => {
            let options = tree
                .visible_children(node)
                .filter(|child| child.kind() == NodeKind::SelectOption)
                .filter_map(|option| {
                    let value = option.props().str(keys::VALUE)?.to_string();
                    let handler = option.props().handler(keys::ON_SELECT)?.clone();
                    Some((value, handler))
                })
                .collect();
            (node.props().handler(keys::ON_SELECT).cloned(), options)
        }
        _ => (node.props().handler(keys::ON_CLICK).cloned(), Vec::new()),
    };
    InteractiveMatch {
        kind: node.kind(),
        handler,
        options,
        whitelist,
    }
}

fn search<'t>(
    tree: &'t Tree,
    nodes: impl Iterator<Item = &'t Node>,
    custom_id: &str,
    whitelist: Option<&Vec<String>>,
) -> Option<InteractiveMatch> {
    for node in nodes {
        let found = match node.kind() {
            NodeKind::Button | NodeKind::Select if node.custom_id() == Some(custom_id) => {
                Some(matched(node, tree, whitelist.cloned()))
            }
            NodeKind::Whitelist => {
                let users = node.props().list(keys::USERS).unwrap_or_default();
                let scoped = narrow(whitelist, users);
                search(tree, tree.visible_children(node), custom_id, Some(&scoped))
            }
            NodeKind::ActionRow
            | NodeKind::Section
            | NodeKind::Accessory
            | NodeKind::Container
            | NodeKind::Ephemeral
            | NodeKind::Message => search(tree, tree.visible_children(node), custom_id, whitelist),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

/// Finds the visible interactive node carrying `custom_id`, inheriting every
/// whitelist on the path to it. Nested whitelists intersect.
pub fn find_interactive(tree: &Tree, custom_id: &str) -> Option<InteractiveMatch> {
    search(tree, tree.visible_roots(), custom_id, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// No listener was bound for this id.
    Unbound,
    /// The node is gone or hidden.
    Missing,
    /// The user is not on the whitelist.
    Denied,
    Handled,
}

/// Delivers component interactions to the callbacks of the live tree.
#[derive(Clone)]
pub(crate) struct EventRouter {
    container: Arc<Mutex<Container>>,
    requester: RenderRequester,
}

impl EventRouter {
    pub(crate) fn new(container: Arc<Mutex<Container>>, requester: RenderRequester) -> Self {
        Self {
            container,
            requester,
        }
    }

    pub(crate) async fn route(&self, interaction: &dyn ComponentInteraction) -> RouteOutcome {
        let custom_id = interaction.custom_id();
        let found = {
            let container = self.container.lock().await;
            if !container.is_bound(custom_id) {
                debug!(custom_id, "component event for an unbound id");
                return RouteOutcome::Unbound;
            }
            find_interactive(container.tree(), custom_id)
        };
        let Some(found) = found else {
            debug!(custom_id, "component event for a node that is no longer visible");
            return RouteOutcome::Missing;
        };
        if !found.permits(interaction.user_id()) {
            debug!(custom_id, user = interaction.user_id(), "ignoring user outside whitelist");
            return RouteOutcome::Denied;
        }

        self.requester.begin_session();
        let event = ComponentEvent::from_interaction(interaction);
        if let Some(handler) = &found.handler {
            handler.call(event.clone()).await;
        }
        for (value, handler) in &found.options {
            if event.values.contains(value) {
                handler.call(event.clone()).await;
            }
        }
        if let Err(err) = interaction.acknowledge().await {
            debug!(custom_id, error = %err, "acknowledge failed; ignoring");
        }
        RouteOutcome::Handled
    }
}

/// Binds every component of `handles` that maps to a live node, and starts a
/// listener for each message not already listened to.
pub(crate) async fn rehydrate(
    router: &EventRouter,
    handles: &[Arc<dyn MessageHandle>],
    listening: &mut HashSet<String>,
    cancel: &CancellationToken,
) {
    {
        let mut container = router.container.lock().await;
        for handle in handles {
            for custom_id in handle.component_ids() {
                if container.is_bound(&custom_id) {
                    continue;
                }
                if find_interactive(container.tree(), &custom_id).is_some() {
                    debug!(%custom_id, message = handle.id(), "binding component");
                    container.bind(custom_id);
                }
            }
        }
    }

    for handle in handles {
        if !listening.insert(handle.id().to_string()) {
            continue;
        }
        let mut events = handle.collect_components();
        let router = router.clone();
        let cancel = cancel.clone();
        let message = handle.id().to_string();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) => {
                            let outcome = router.route(event.as_ref()).await;
                            debug!(%message, ?outcome, "component event routed");
                        }
                        None => break,
                    },
                }
            }
            debug!(%message, "component listener stopped");
        });
    }
}
