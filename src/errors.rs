//! Fleet Agent Error Hierarchy
//!
//! Failures are grouped by the layer that produced them: the coordination
//! tree, the tree-encoded command protocol, local process execution, the
//! heartbeat store and configuration. The supervisory loop inspects the
//! coordination variants to decide between swallowing, recovering and
//! shutting down.

use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Coordination tree operation failures
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Remote command request/response failures
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Local script or command execution failures
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Producer liveness heartbeat failures
    #[error(transparent)]
    Heartbeat(#[from] HeartbeatError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error("{0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CoordinationError {
    /// Transient loss of connectivity to the coordination service
    #[error("Connection to coordination service lost")]
    ConnectionLoss,

    /// The owning session has expired; ephemeral nodes are gone
    #[error("Coordination session expired")]
    SessionExpired,

    #[error("Node does not exist: {0}")]
    NoNode(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    /// Expected-version check failed on write or delete
    #[error("Version conflict on {path} (expected: {expected}, actual: {actual})")]
    BadVersion {
        path: String,
        expected: i32,
        actual: i32,
    },

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Ephemeral node cannot have children: {0}")]
    NoChildrenForEphemerals(String),

    #[error("Session not connected after {0:?}")]
    ConnectTimeout(Duration),

    /// Operation issued on a session that was closed locally
    #[error("Coordination session closed")]
    Closed,

    /// Any other failure reported by the coordination service
    #[error("Coordination service error on {path}: {reason}")]
    Service { path: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid host address: {0}")]
    InvalidHost(String),

    #[error("Command text must not be empty")]
    EmptyCommand,

    /// Request node whose name or payload cannot be decoded
    #[error("Malformed request at {path}: {reason}")]
    MalformedRequest { path: String, reason: String },

    /// No new result node appeared within the command timeout
    #[error("No result for command {command_id} after {waited:?}")]
    ResultTimeout { command_id: u64, waited: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with status {code:?}")]
    NonZeroExit { command: String, code: Option<i32> },

    #[error("`{command}` killed after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` has no stdout pipe")]
    MissingStdout { command: String },
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Heartbeat pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    Query(#[from] tokio_postgres::Error),
}

impl Error {
    /// Transient connectivity loss, swallowed by the abort policy
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::ConnectionLoss))
    }

    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::SessionExpired))
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NoNode(_)))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, Error::Coordination(CoordinationError::NodeExists(_)))
    }
}

// ============== Conversion Implementations ============== //
impl From<deadpool_postgres::PoolError> for Error {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        Error::Heartbeat(HeartbeatError::Pool(e.to_string()))
    }
}

impl From<deadpool_postgres::CreatePoolError> for Error {
    fn from(e: deadpool_postgres::CreatePoolError) -> Self {
        Error::Heartbeat(HeartbeatError::Pool(e.to_string()))
    }
}

impl From<tokio_postgres::Error> for Error {
    fn from(e: tokio_postgres::Error) -> Self {
        Error::Heartbeat(HeartbeatError::Query(e))
    }
}
