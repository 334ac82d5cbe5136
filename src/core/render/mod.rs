//! Declarative rendering onto the retained tree.

pub mod element;
mod reconcile;
mod root;
mod scope;

pub use element::{Element, HostElement};
pub use reconcile::{IdAllocator, Reconciler};
pub(crate) use root::mount_mutations;
pub use root::{render_once, Root};
pub use scope::{RenderRequester, Scope, SessionId, State, StoreState};
