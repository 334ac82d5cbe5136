use super::{NodeId, NodeKind};
use std::fmt;

/// Shape errors raised while mutating or serializing the tree.
///
/// Any of these aborts the render pass or dispatch task that hit it; the next
/// commit starts from the last good tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// A child kind the parent does not accept. `parent` is `None` for the render root.
    TypeMismatch {
        parent: Option<NodeKind>,
        expected: &'static [NodeKind],
        found: NodeKind,
    },
    /// A required child is absent.
    MissingChild {
        parent: NodeKind,
        expected: &'static [NodeKind],
    },
    /// A required prop is absent or holds the wrong value type.
    InvalidProp {
        kind: NodeKind,
        prop: &'static str,
    },
    UnknownNode(NodeId),
    /// A node was attached under a parent it is not a child of.
    NotAChild { parent: Option<NodeId>, child: NodeId },
    /// A node shape the dispatcher cannot serialize yet.
    NotImplemented(String),
}

fn kind_list(kinds: &[NodeKind]) -> String {
    kinds
        .iter()
        .map(|kind| kind.name())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::TypeMismatch {
                parent,
                expected,
                found,
            } => {
                let parent = parent.map_or("root", NodeKind::name);
                write!(
                    f,
                    "type mismatch: {parent} expects one of [{}] but found {found}",
                    kind_list(expected)
                )
            }
            TreeError::MissingChild { parent, expected } => write!(
                f,
                "{parent} requires a child of kind [{}]",
                kind_list(expected)
            ),
            TreeError::InvalidProp { kind, prop } => {
                write!(f, "{kind} is missing a valid `{prop}` prop")
            }
            TreeError::UnknownNode(id) => write!(f, "unknown node {id}"),
            TreeError::NotAChild { parent, child } => match parent {
                Some(parent) => write!(f, "node {child} is not a child of {parent}"),
                None => write!(f, "node {child} is not attached to the root"),
            },
            TreeError::NotImplemented(what) => write!(f, "not implemented: {what}"),
        }
    }
}

impl std::error::Error for TreeError {}
