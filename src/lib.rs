//! Reconcord renders declarative component trees into chat-platform messages.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the retained node tree, the reconciler that keeps it in
//!   sync with a component tree, and the dispatcher that splits the tree into
//!   pages and sends them through an [`api::client::Interaction`].
//! - [`api`] defines the outbound page payloads and the client traits a chat
//!   library implements.
//! - [`store`] provides keyed storage that components subscribe to.
//! - [`audio`] mixes PCM sources onto a 20 ms frame clock for voice playback.
//!
//! A bot mounts a [`core::render::Root`] per command interaction; everything
//! else runs on spawned tokio tasks owned by that root.

pub mod api;
pub mod audio;
pub mod core;
pub mod store;
pub mod utils;
