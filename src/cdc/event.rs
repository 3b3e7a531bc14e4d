use std::fmt;

use crate::constants::LIVENESS_QUEUE;
use crate::constants::LIVENESS_SEGMENT;
use crate::constants::TOPOLOGY_QUEUE;
use crate::coordination::Stat;
use crate::Error;
use crate::Result;

/// Leading field of every queue entry
pub const OPCODE: &str = "0";
const FIELD_SEP: char = '#';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Delete = 1,
    Update = 2,
    Create = 3,
}

impl ChangeKind {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ChangeKind::Delete),
            2 => Some(ChangeKind::Update),
            3 => Some(ChangeKind::Create),
            _ => None,
        }
    }
}

/// Which of the two independent event streams a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Liveness,
    Topology,
}

impl QueueKind {
    /// Any path with a `pingstatus` segment is a liveness event.
    pub fn classify(path: &str) -> Self {
        if path.split('/').any(|segment| segment == LIVENESS_SEGMENT) {
            QueueKind::Liveness
        } else {
            QueueKind::Topology
        }
    }

    /// Queue root name under the tree root
    pub fn segment(self) -> &'static str {
        match self {
            QueueKind::Liveness => LIVENESS_QUEUE,
            QueueKind::Topology => TOPOLOGY_QUEUE,
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            QueueKind::Liveness => write!(f, "liveness"),
            QueueKind::Topology => write!(f, "topology"),
        }
    }
}

/// One observed mutation of the topology subtree.
///
/// Deletions carry no transaction ids and no payload; `timestamp` is the
/// observation time for them and the node's mtime otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: String,
    pub txn_id: Option<i64>,
    pub parent_txn_id: Option<i64>,
    pub data: String,
    pub timestamp: i64,
}

impl ChangeEvent {
    pub fn deleted(
        path: &str,
        observed_at: i64,
    ) -> Self {
        Self {
            kind: ChangeKind::Delete,
            path: path.to_string(),
            txn_id: None,
            parent_txn_id: None,
            data: String::new(),
            timestamp: observed_at,
        }
    }

    pub fn created(
        path: &str,
        stat: &Stat,
        parent_txn_id: i64,
        data: String,
    ) -> Self {
        Self::written(ChangeKind::Create, path, stat, parent_txn_id, data)
    }

    pub fn updated(
        path: &str,
        stat: &Stat,
        parent_txn_id: i64,
        data: String,
    ) -> Self {
        Self::written(ChangeKind::Update, path, stat, parent_txn_id, data)
    }

    fn written(
        kind: ChangeKind,
        path: &str,
        stat: &Stat,
        parent_txn_id: i64,
        data: String,
    ) -> Self {
        Self {
            kind,
            path: path.to_string(),
            txn_id: Some(stat.czxid),
            parent_txn_id: Some(parent_txn_id),
            data,
            timestamp: stat.mtime,
        }
    }

    pub fn queue(&self) -> QueueKind {
        QueueKind::classify(&self.path)
    }

    /// `0#txn#path#parentTxn#kind#data#mtime`, with empty id and data fields
    /// for deletions.
    pub fn encode(&self) -> String {
        let id = |v: Option<i64>| v.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{OPCODE}#{}#{}#{}#{}#{}#{}",
            id(self.txn_id),
            self.path,
            id(self.parent_txn_id),
            self.kind.code(),
            self.data,
            self.timestamp
        )
    }

    /// Inverse of [`ChangeEvent::encode`]. The data field may contain `#`.
    pub fn decode(entry: &str) -> Result<Self> {
        let malformed = |what: &str| Error::Fatal(format!("malformed queue entry {entry:?}: {what}"));

        let mut fields = entry.splitn(6, FIELD_SEP);
        let mut next = |name: &str| fields.next().ok_or_else(|| malformed(name));
        let opcode = next("opcode")?;
        let txn_id = next("txn id")?;
        let path = next("path")?;
        let parent_txn_id = next("parent txn id")?;
        let kind = next("kind")?;
        let rest = next("data")?;
        if opcode != OPCODE {
            return Err(malformed("unknown opcode"));
        }
        let (data, timestamp) = rest.rsplit_once(FIELD_SEP).ok_or_else(|| malformed("timestamp"))?;

        let parse_id = |v: &str| -> Result<Option<i64>> {
            if v.is_empty() {
                return Ok(None);
            }
            v.parse::<i64>().map(Some).map_err(|_| malformed("txn id"))
        };
        let kind = kind
            .parse::<u8>()
            .ok()
            .and_then(ChangeKind::from_code)
            .ok_or_else(|| malformed("kind"))?;

        Ok(Self {
            kind,
            path: path.to_string(),
            txn_id: parse_id(txn_id)?,
            parent_txn_id: parse_id(parent_txn_id)?,
            data: data.to_string(),
            timestamp: timestamp.parse::<i64>().map_err(|_| malformed("timestamp"))?,
        })
    }
}
