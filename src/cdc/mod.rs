//! Change-data-capture of the topology subtree.
//!
//! Every create, update and delete observed under `{root}/instances` is
//! appended as a sequential node to `{root}/queue` (liveness probes) or
//! `{root}/jaqueue` (everything else). Within one queue the sequence number
//! is the event order; the two queues are independent streams.

mod collector;
mod event;
mod heartbeat;
mod listener;
pub use collector::*;
pub use event::*;
pub use heartbeat::*;
pub use listener::*;

#[cfg(test)]
mod event_test;
