//! Data model shared between the core and its collaborators.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EnvError;

/// Opaque address of a node, as registered with the directory.
///
/// Typically a full multiaddr such as `/ip4/10.0.0.2/tcp/4001/p2p/<id>`,
/// but nothing in this crate interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(String);

impl NodeAddress {
    /// Creates an address from any string-like value.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the address is empty (transport not yet listening).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeAddress {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeAddress {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier of a connection, assigned by the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Creates a new random ConnectionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic ConnectionId from a counter (for simulation).
    pub fn from_seq(seq: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[8..16].copy_from_slice(&seq.to_be_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Requested,
    Open,
    Closed,
    Rejected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Requested => "requested",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A connection as persisted by the record store.
///
/// The core only reads these; the substrate owns the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub sender: NodeAddress,
    pub receiver: NodeAddress,
    pub status: ConnectionStatus,
}

impl Connection {
    /// True if `addr` is the sender or the receiver.
    pub fn involves(&self, addr: &NodeAddress) -> bool {
        &self.sender == addr || &self.receiver == addr
    }

    /// Participants of the connection other than `me`.
    pub fn participants_except(&self, me: &NodeAddress) -> Vec<NodeAddress> {
        [&self.sender, &self.receiver]
            .into_iter()
            .filter(|p| *p != me)
            .cloned()
            .collect()
    }

    /// Fails unless the connection is in the given status.
    pub fn ensure_status(&self, status: ConnectionStatus) -> Result<(), EnvError> {
        if self.status == status {
            Ok(())
        } else {
            Err(EnvError::InvalidConnectionState {
                id: self.id.to_string(),
                status: self.status.to_string(),
            })
        }
    }
}

/// A message sent over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMessage {
    pub conn_id: ConnectionId,
    /// Monotonically increasing per connection
    pub seq_no: u64,
    pub payload: Vec<u8>,
}

/// Byte sizes observed by one query round trip.
///
/// `query_bytes` is known as soon as the query is built; `response` is
/// the response size, or the reason no response arrived.
#[derive(Debug)]
pub struct QueryExchange {
    pub query_bytes: usize,
    pub response: Result<usize, EnvError>,
}

impl QueryExchange {
    /// A round trip that produced a response.
    pub fn answered(query_bytes: usize, response_bytes: usize) -> Self {
        Self {
            query_bytes,
            response: Ok(response_bytes),
        }
    }

    /// A query that went out but got no usable response.
    pub fn failed(query_bytes: usize, err: EnvError) -> Self {
        Self {
            query_bytes,
            response: Err(err),
        }
    }
}

/// A peer in the local peer set, with the network addresses known for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownPeer {
    pub address: NodeAddress,
    pub network_addrs: Vec<String>,
}

/// Lifecycle notification published by the substrate's listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Opened(Connection),
    Closed(ConnectionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(sender: &str, receiver: &str) -> Connection {
        Connection {
            id: ConnectionId::from_seq(1),
            sender: sender.into(),
            receiver: receiver.into(),
            status: ConnectionStatus::Open,
        }
    }

    #[test]
    fn test_participants_except_self() {
        let c = conn("a", "b");
        assert_eq!(c.participants_except(&"a".into()), vec![NodeAddress::from("b")]);
        assert_eq!(c.participants_except(&"b".into()), vec![NodeAddress::from("a")]);
        assert_eq!(c.participants_except(&"z".into()).len(), 2);
    }

    #[test]
    fn test_ensure_status() {
        let mut c = conn("a", "b");
        assert!(c.ensure_status(ConnectionStatus::Open).is_ok());
        c.status = ConnectionStatus::Closed;
        let err = c.ensure_status(ConnectionStatus::Open).unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[test]
    fn test_connection_id_from_seq_is_stable() {
        assert_eq!(ConnectionId::from_seq(7), ConnectionId::from_seq(7));
        assert_ne!(ConnectionId::from_seq(7), ConnectionId::from_seq(8));
    }

    #[test]
    fn test_node_address_display() {
        let addr = NodeAddress::from("/ip4/127.0.0.1/tcp/4001");
        assert_eq!(addr.to_string(), "/ip4/127.0.0.1/tcp/4001");
        assert!(!addr.is_empty());
        assert!(NodeAddress::new("").is_empty());
    }
}
