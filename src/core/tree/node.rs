use super::props::{apply_delta, PropDelta, Props};
use super::{NodeKind, TreeError};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Visibility independent of tree membership.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Visibility {
    #[default]
    Visible,
    /// Hidden by the element's own `hidden` flag.
    Hidden,
    /// Hidden by the reconciler while the owning component waits on async work.
    Suspended,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    /// Reconciler identity among siblings.
    pub(crate) key: String,
    pub(crate) props: Props,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) visibility: Visibility,
    /// Stable interactive identifier, assigned once at creation.
    pub(crate) custom_id: Option<String>,
    attached: bool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_visible(&self) -> bool {
        self.visibility == Visibility::Visible
    }

    pub fn custom_id(&self) -> Option<&str> {
        self.custom_id.as_deref()
    }
}

/// One step of the reconciler's mutation log.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        id: NodeId,
        kind: NodeKind,
        key: String,
        props: Props,
        custom_id: Option<String>,
    },
    Append {
        parent: Option<NodeId>,
        child: NodeId,
    },
    InsertBefore {
        parent: Option<NodeId>,
        child: NodeId,
        before: NodeId,
    },
    Remove {
        parent: Option<NodeId>,
        child: NodeId,
    },
    Update {
        id: NodeId,
        delta: PropDelta,
    },
    Hide {
        id: NodeId,
        suspended: bool,
    },
    Unhide {
        id: NodeId,
    },
}

/// Arena of nodes plus the ordered top-level list.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    nodes: HashMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, TreeError> {
        self.nodes.get(&id).ok_or(TreeError::UnknownNode(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Visible nodes among `ids`, in order.
    pub fn visible<'a>(&'a self, ids: &'a [NodeId]) -> impl Iterator<Item = &'a Node> + 'a {
        ids.iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.is_visible())
    }

    pub fn visible_roots(&self) -> impl Iterator<Item = &Node> + '_ {
        self.visible(&self.roots)
    }

    pub fn visible_children<'a>(&'a self, node: &'a Node) -> impl Iterator<Item = &'a Node> + 'a {
        self.visible(&node.children)
    }

    /// Registers a detached node.
    pub fn create_instance(
        &mut self,
        id: NodeId,
        kind: NodeKind,
        key: String,
        props: Props,
        custom_id: Option<String>,
    ) {
        self.nodes.insert(
            id,
            Node {
                id,
                kind,
                key,
                props,
                children: Vec::new(),
                parent: None,
                visibility: Visibility::Visible,
                custom_id,
                attached: false,
            },
        );
    }

    fn check_accepts(&self, parent: Option<NodeId>, child: NodeKind) -> Result<(), TreeError> {
        let (parent_kind, expected) = match parent {
            Some(id) => {
                let kind = self.node(id)?.kind;
                (Some(kind), kind.accepted())
            }
            None => (None, NodeKind::root_accepted()),
        };
        if expected.contains(&child) {
            Ok(())
        } else {
            Err(TreeError::TypeMismatch {
                parent: parent_kind,
                expected,
                found: child,
            })
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Vec<NodeId>, TreeError> {
        match parent {
            Some(id) => self
                .nodes
                .get_mut(&id)
                .map(|node| &mut node.children)
                .ok_or(TreeError::UnknownNode(id)),
            None => Ok(&mut self.roots),
        }
    }

    /// Removes `child` from wherever it currently sits, keeping its subtree.
    fn detach(&mut self, child: NodeId) -> Result<(), TreeError> {
        let node = self.node(child)?;
        if !node.attached {
            return Ok(());
        }
        let parent = node.parent;
        self.siblings_mut(parent)?.retain(|id| *id != child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.attached = false;
            node.parent = None;
        }
        Ok(())
    }

    fn attach(
        &mut self,
        parent: Option<NodeId>,
        child: NodeId,
        before: Option<NodeId>,
    ) -> Result<(), TreeError> {
        let kind = self.node(child)?.kind;
        self.check_accepts(parent, kind)?;
        self.detach(child)?;
        let siblings = self.siblings_mut(parent)?;
        match before {
            Some(before) => {
                let index = siblings
                    .iter()
                    .position(|id| *id == before)
                    .ok_or(TreeError::NotAChild {
                        parent,
                        child: before,
                    })?;
                siblings.insert(index, child);
            }
            None => siblings.push(child),
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.attached = true;
            node.parent = parent;
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: Option<NodeId>, child: NodeId) -> Result<(), TreeError> {
        self.attach(parent, child, None)
    }

    pub fn insert_before(
        &mut self,
        parent: Option<NodeId>,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), TreeError> {
        self.attach(parent, child, Some(before))
    }

    /// Detaches `child` and drops its whole subtree from the arena.
    pub fn remove_child(&mut self, parent: Option<NodeId>, child: NodeId) -> Result<(), TreeError> {
        let node = self.node(child)?;
        if !node.attached || node.parent != parent {
            return Err(TreeError::NotAChild { parent, child });
        }
        self.detach(child)?;
        let mut pending = vec![child];
        while let Some(id) = pending.pop() {
            if let Some(node) = self.nodes.remove(&id) {
                pending.extend(node.children);
            }
        }
        Ok(())
    }

    pub fn update_instance(&mut self, id: NodeId, delta: &PropDelta) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        apply_delta(&mut node.props, delta);
        Ok(())
    }

    pub fn hide(&mut self, id: NodeId, suspended: bool) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        node.visibility = if suspended {
            Visibility::Suspended
        } else {
            Visibility::Hidden
        };
        Ok(())
    }

    pub fn unhide(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        node.visibility = Visibility::Visible;
        Ok(())
    }

    pub fn apply(&mut self, mutation: Mutation) -> Result<(), TreeError> {
        match mutation {
            Mutation::Create {
                id,
                kind,
                key,
                props,
                custom_id,
            } => {
                self.create_instance(id, kind, key, props, custom_id);
                Ok(())
            }
            Mutation::Append { parent, child } => self.append_child(parent, child),
            Mutation::InsertBefore {
                parent,
                child,
                before,
            } => self.insert_before(parent, child, before),
            Mutation::Remove { parent, child } => self.remove_child(parent, child),
            Mutation::Update { id, delta } => self.update_instance(id, &delta),
            Mutation::Hide { id, suspended } => self.hide(id, suspended),
            Mutation::Unhide { id } => self.unhide(id),
        }
    }
}
