//! Retained node tree.
//!
//! Nodes live in an arena keyed by [`NodeId`]. Every attach is checked against
//! the parent's acceptance table, so a malformed composition fails at the
//! mutation that introduced it with a [`TreeError::TypeMismatch`].

mod container;
mod error;
mod kind;
mod node;
pub mod props;

pub use container::Container;
pub use error::TreeError;
pub use kind::NodeKind;
pub use node::{Mutation, Node, NodeId, Tree, Visibility};
pub use props::{diff_props, Handler, PropDelta, PropValue, Props, PropsExt};
