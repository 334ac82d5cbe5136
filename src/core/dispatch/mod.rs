//! From committed tree to platform calls: segmentation, the ordered dispatch
//! queue and callback rehydration.

mod queue;
mod rehydrate;
mod segment;
mod serialize;

pub use queue::{DispatchError, DispatchHandle, Dispatcher};
pub use rehydrate::{find_interactive, InteractiveMatch, RouteOutcome};
pub use segment::compute_pages;

#[cfg(test)]
mod tests;
