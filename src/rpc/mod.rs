//! Remote command dispatch encoded as tree mutations.
//!
//! A client appends `cmd@{seq}` under `{root}/remotecontrol/{ip}/input`; the
//! host's agent claims it by deleting it, runs the command and streams each
//! stdout line into `{root}/remotecontrol/{ip}/output/cmd@{id}_{n}`,
//! terminated by `EOF`.

mod client;
mod exec_task;
mod handle;
mod request;
pub use client::*;
pub use exec_task::*;
pub use handle::*;
pub use request::*;

#[cfg(test)]
mod client_test;
#[cfg(test)]
mod exec_task_test;

use crate::constants::COMMAND_PREFIX;
use crate::constants::INPUT;
use crate::constants::OUTPUT;
use crate::constants::REMOTECONTROL;
use crate::coordination::ops::join_path;

/// `{root}/remotecontrol/{host}`
pub fn host_path(
    root: &str,
    host: &str,
) -> String {
    join_path(&join_path(root, REMOTECONTROL), host)
}

pub fn input_path(
    root: &str,
    host: &str,
) -> String {
    join_path(&host_path(root, host), INPUT)
}

pub fn output_path(
    root: &str,
    host: &str,
) -> String {
    join_path(&host_path(root, host), OUTPUT)
}

/// Name prefix shared by every result node of `command_id`
pub fn result_prefix(command_id: u64) -> String {
    format!("{COMMAND_PREFIX}{command_id}_")
}

pub fn result_node_name(
    command_id: u64,
    seq: u64,
) -> String {
    format!("{}{seq}", result_prefix(command_id))
}
