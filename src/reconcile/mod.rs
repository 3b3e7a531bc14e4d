//! Local instance discovery mirrored into the topology subtree.

mod discovery;
mod reconciler;
pub use discovery::*;
pub use reconciler::*;
