//! Evaluation of an element tree and its diff against the committed tree.
//!
//! A pass first evaluates every component into a [`Rendered`] snapshot, then
//! [`Reconciler::diff`] compares that snapshot with the retained [`Tree`] and
//! emits the mutation log that turns one into the other. Nodes are matched by
//! their key path, which encodes position or explicit key plus kind, so a node
//! keeps its id and custom id for as long as it stays at the same logical spot.

use super::element::{ComponentElement, Element, HostElement};
use super::scope::RenderState;
use crate::core::tree::{diff_props, Mutation, NodeId, NodeKind, Props, Tree, Visibility};
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// One host node as produced by a render pass.
#[derive(Debug, Clone)]
pub(crate) struct RenderedHost {
    pub(crate) key: String,
    pub(crate) kind: NodeKind,
    pub(crate) props: Props,
    pub(crate) hidden: bool,
    pub(crate) children: Vec<Rendered>,
}

#[derive(Debug, Clone)]
pub(crate) enum Rendered {
    Host(RenderedHost),
    /// A component waiting on async work. Whatever it committed before stays
    /// mounted but hidden until it resumes.
    Suspended { scope: String },
}

fn segment(element: &Element, index: usize) -> String {
    match element.key() {
        Some(key) => format!("#{key}"),
        None => index.to_string(),
    }
}

/// Evaluates the whole element tree under a fresh pass.
pub(crate) fn evaluate(root: &Element, state: &mut RenderState) -> Vec<Rendered> {
    state.start_pass();
    let mut out = Vec::new();
    evaluate_into(root, String::new(), state, &mut out);
    state.finish_pass();
    out
}

fn evaluate_children(children: &[Element], parent: &str, state: &mut RenderState) -> Vec<Rendered> {
    let mut out = Vec::new();
    for (index, child) in children.iter().enumerate() {
        let path = format!("{parent}/{}", segment(child, index));
        evaluate_into(child, path, state, &mut out);
    }
    out
}

fn evaluate_into(element: &Element, path: String, state: &mut RenderState, out: &mut Vec<Rendered>) {
    match element {
        Element::Empty => {}
        Element::Fragment(children) => out.extend(evaluate_children(children, &path, state)),
        Element::Host(host) => out.push(evaluate_host(host, path, state)),
        Element::Component(component) => evaluate_component(component, path, state, out),
    }
}

fn evaluate_host(host: &HostElement, path: String, state: &mut RenderState) -> Rendered {
    let key = format!("{path}:{}", host.kind);
    let children = evaluate_children(&host.children, &key, state);
    Rendered::Host(RenderedHost {
        key,
        kind: host.kind,
        props: host.props.clone(),
        hidden: host.hidden,
        children,
    })
}

fn evaluate_component(
    component: &ComponentElement,
    path: String,
    state: &mut RenderState,
    out: &mut Vec<Rendered>,
) {
    let scope_path = format!("{path}:{}", component.name);
    let mut scope = state.scope(scope_path.clone());
    let output = (component.render)(&mut scope);
    if scope.into_suspended() {
        debug!(scope = %scope_path, "component suspended");
        out.push(Rendered::Suspended { scope: scope_path });
        return;
    }
    out.extend(evaluate_children(std::slice::from_ref(&output), &scope_path, state));
}

/// Collision-free identities for retained nodes.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next_node: u64,
}

impl IdAllocator {
    pub fn node_id(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    /// Stable identifier an interactive component carries on the platform.
    pub fn custom_id(&mut self) -> String {
        Uuid::new_v4().simple().to_string()
    }
}

enum Slot<'r> {
    Existing(NodeId, &'r RenderedHost),
    Fresh(&'r RenderedHost),
    Suspended(NodeId),
}

#[derive(Debug, Default)]
pub struct Reconciler {
    ids: IdAllocator,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutations that turn the committed top level into `rendered`.
    pub(crate) fn diff(&mut self, tree: &Tree, rendered: &[Rendered]) -> Vec<Mutation> {
        let mut mutations = Vec::new();
        self.diff_children(tree, None, tree.roots(), rendered, &mut mutations);
        mutations
    }

    fn diff_children(
        &mut self,
        tree: &Tree,
        parent: Option<NodeId>,
        old: &[NodeId],
        rendered: &[Rendered],
        mutations: &mut Vec<Mutation>,
    ) {
        let mut claimed = HashSet::new();
        let mut slots = Vec::with_capacity(rendered.len());
        for item in rendered {
            match item {
                Rendered::Host(host) => {
                    let existing = old.iter().copied().find(|id| {
                        !claimed.contains(id)
                            && tree
                                .get(*id)
                                .is_some_and(|node| node.key() == host.key && node.kind() == host.kind)
                    });
                    match existing {
                        Some(id) => {
                            claimed.insert(id);
                            slots.push(Slot::Existing(id, host));
                        }
                        None => slots.push(Slot::Fresh(host)),
                    }
                }
                Rendered::Suspended { scope } => {
                    let prefix = format!("{scope}/");
                    for id in old.iter().copied() {
                        let owned = tree
                            .get(id)
                            .is_some_and(|node| node.key().starts_with(&prefix));
                        if owned && claimed.insert(id) {
                            slots.push(Slot::Suspended(id));
                        }
                    }
                }
            }
        }

        let mut current: Vec<NodeId> = Vec::with_capacity(old.len());
        for id in old.iter().copied() {
            if claimed.contains(&id) {
                current.push(id);
            } else {
                mutations.push(Mutation::Remove { parent, child: id });
            }
        }

        for (position, slot) in slots.into_iter().enumerate() {
            let id = match slot {
                Slot::Existing(id, host) => {
                    self.patch(tree, id, host, mutations);
                    id
                }
                Slot::Suspended(id) => {
                    if tree.get(id).is_some_and(|node| node.visibility() != Visibility::Suspended) {
                        mutations.push(Mutation::Hide { id, suspended: true });
                    }
                    id
                }
                Slot::Fresh(host) => self.create(host, mutations),
            };
            if current.get(position) == Some(&id) {
                continue;
            }
            current.retain(|existing| *existing != id);
            match current.get(position).copied() {
                Some(before) => {
                    mutations.push(Mutation::InsertBefore {
                        parent,
                        child: id,
                        before,
                    });
                    current.insert(position, id);
                }
                None => {
                    mutations.push(Mutation::Append { parent, child: id });
                    current.push(id);
                }
            }
        }
    }

    /// Brings a kept node up to date: prop delta, visibility, then children.
    fn patch(&mut self, tree: &Tree, id: NodeId, host: &RenderedHost, mutations: &mut Vec<Mutation>) {
        let Some(node) = tree.get(id) else {
            return;
        };
        if let Some(delta) = diff_props(node.props(), &host.props) {
            mutations.push(Mutation::Update { id, delta });
        }
        match (node.visibility(), host.hidden) {
            (Visibility::Visible, true) | (Visibility::Suspended, true) => {
                mutations.push(Mutation::Hide {
                    id,
                    suspended: false,
                });
            }
            (Visibility::Hidden, false) | (Visibility::Suspended, false) => {
                mutations.push(Mutation::Unhide { id });
            }
            _ => {}
        }
        self.diff_children(tree, Some(id), node.children(), &host.children, mutations);
    }

    /// Creates a detached subtree and returns its root id.
    fn create(&mut self, host: &RenderedHost, mutations: &mut Vec<Mutation>) -> NodeId {
        let id = self.ids.node_id();
        let custom_id = host.kind.is_interactive().then(|| self.ids.custom_id());
        mutations.push(Mutation::Create {
            id,
            kind: host.kind,
            key: host.key.clone(),
            props: host.props.clone(),
            custom_id,
        });
        if host.hidden {
            mutations.push(Mutation::Hide {
                id,
                suspended: false,
            });
        }
        for child in &host.children {
            if let Rendered::Host(child) = child {
                let child = self.create(child, mutations);
                mutations.push(Mutation::Append {
                    parent: Some(id),
                    child,
                });
            }
        }
        id
    }
}
