//! # fleet-agent
//!
//! Host agent for a fleet of database servers, coordinated through a
//! ZooKeeper-style tree:
//!
//! - [`rpc`]: operators run shell commands on a host by appending request
//!   nodes; the host's agent streams stdout back as result nodes.
//! - [`reconcile`]: each agent mirrors its locally running database
//!   instances into the topology subtree as ephemeral nodes.
//! - [`cdc`]: a collector turns every change of the topology subtree into
//!   ordered queue entries for downstream consumers.
//!
//! All tree access goes through [`coordination::CoordinationClient`];
//! [`coordination::MemoryTree`] is the in-process implementation.

pub mod agent;
pub mod cdc;
mod config;
pub mod constants;
pub mod coordination;
mod errors;
pub mod exec;
pub mod reconcile;
pub mod rpc;
pub mod utils;
pub mod watcher;

pub use agent::Agent;
pub use cdc::CdcCollector;
pub use config::*;
pub use errors::*;
pub use rpc::RemoteCommand;
pub use utils::*;
