//! Session-scoped watch dispatch and new-child discovery.

mod abort;
mod hub;
mod listener;
mod tracker;
pub use abort::*;
pub use hub::*;
pub use listener::*;
pub use tracker::*;

#[cfg(test)]
mod tracker_test;
