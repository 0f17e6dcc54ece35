//! Connection substrate abstraction.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::EnvError;
use crate::types::{Connection, ConnectionEvent, ConnectionId, KnownPeer, NodeAddress, QueryExchange};

/// The peer transport and connection-state protocol, seen from the node.
///
/// The wire protocol behind these calls is not this crate's concern;
/// only the outcome of each call is.
///
/// # Connection Flow
///
/// ```text
/// Node                   Substrate                  Peer
///   |-- request_connection ->|                        |
///   |                        |-- open handshake ----->|
///   |<-- ConnectionId -------|<-- accept -------------|
///   |-- send_data(id) ------>|-- data --------------->|
///   |-- close_connection --->|-- close -------------->|
/// ```
#[async_trait]
pub trait ConnectionService: Send + Sync + 'static {
    /// This node's full address, or `None` while the transport is not
    /// yet listening.
    fn full_address(&self) -> Option<NodeAddress>;

    /// Adds a peer to the local peer set.
    async fn add_peer(&self, addr: &NodeAddress) -> Result<(), EnvError>;

    /// Size of the local peer set, counting this node.
    fn peer_count(&self) -> usize;

    /// Peers in the local peer set, excluding this node.
    fn known_peers(&self) -> Vec<KnownPeer>;

    /// Opens a connection to `peer`.
    ///
    /// # Returns
    /// * `Ok(id)` - The connection is open and persisted
    /// * `Err(_)` - The peer rejected it or could not be reached
    async fn request_connection(&self, peer: &NodeAddress) -> Result<ConnectionId, EnvError>;

    /// Closes a connection this node participates in.
    async fn close_connection(&self, id: ConnectionId) -> Result<(), EnvError>;

    /// Sends a payload over an open connection.
    async fn send_data(&self, id: ConnectionId, payload: Vec<u8>) -> Result<(), EnvError>;

    /// Asks `peer` for the message `seq_no` of `connection`.
    ///
    /// # Returns
    /// * `Ok(exchange)` - The query went out; the exchange carries the
    ///   response size or the response failure
    /// * `Err(_)` - The query could not be built or sent at all
    async fn query_for_message(
        &self,
        peer: &NodeAddress,
        connection: &Connection,
        seq_no: u64,
    ) -> Result<QueryExchange, EnvError>;

    /// Asks `peer` directly for up to `max` of the peers it knows.
    async fn request_peers(&self, peer: &NodeAddress, max: usize) -> Result<Vec<NodeAddress>, EnvError>;

    /// Subscribes to lifecycle events raised by the substrate's listeners.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
}
