//! Record store abstraction.

use async_trait::async_trait;

use crate::error::EnvError;
use crate::types::{Connection, ConnectionId, ConnectionStatus, DataMessage, NodeAddress};

/// Predicate over persisted connections. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionFilter {
    pub sender: Option<NodeAddress>,
    pub receiver: Option<NodeAddress>,
    pub status: Option<ConnectionStatus>,
}

impl ConnectionFilter {
    /// Connections this node opened that are still open.
    pub fn open_outgoing(me: &NodeAddress) -> Self {
        Self {
            sender: Some(me.clone()),
            receiver: None,
            status: Some(ConnectionStatus::Open),
        }
    }

    /// Open connections from `sender` to `receiver`.
    pub fn open_between(sender: &NodeAddress, receiver: &NodeAddress) -> Self {
        Self {
            sender: Some(sender.clone()),
            receiver: Some(receiver.clone()),
            status: Some(ConnectionStatus::Open),
        }
    }

    /// True if `conn` satisfies every set field.
    pub fn matches(&self, conn: &Connection) -> bool {
        self.sender.as_ref().map_or(true, |s| &conn.sender == s)
            && self.receiver.as_ref().map_or(true, |r| &conn.receiver == r)
            && self.status.map_or(true, |st| conn.status == st)
    }
}

/// Persistent view of connections and messages.
///
/// Random selection happens on the store side so that large stores
/// never need a full scan to pick one row.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Picks one connection matching `filter` uniformly at random.
    async fn random_connection(&self, filter: &ConnectionFilter) -> Result<Option<Connection>, EnvError>;

    /// Counts the connections matching `filter`.
    async fn count_connections(&self, filter: &ConnectionFilter) -> Result<usize, EnvError>;

    /// Picks one persisted message uniformly at random.
    async fn random_message(&self) -> Result<Option<DataMessage>, EnvError>;

    /// Fetches a connection by ID.
    async fn connection(&self, id: ConnectionId) -> Result<Option<Connection>, EnvError>;
}
