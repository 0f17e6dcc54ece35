//! In-memory connection substrate and record store with fault injection.
//!
//! Remote peers are not simulated as processes: a known peer accepts
//! every connection unless a fault says otherwise, and answers queries
//! from the messages this node stored.

use async_trait::async_trait;
use peersim_env::{
    Connection, ConnectionEvent, ConnectionFilter, ConnectionId, ConnectionService, ConnectionStatus,
    DataMessage, EnvError, KnownPeer, NodeAddress, QueryExchange, RecordStore,
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

/// Fixed part of an encoded query: connection ID plus sequence number.
pub const QUERY_HEADER_BYTES: usize = 16 + 8;

const EVENT_CAPACITY: usize = 256;

/// Faults to inject into subsequent calls.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Peers reject every connection request
    pub reject_connections: bool,
    pub fail_sends: bool,
    pub fail_closes: bool,
    /// Queries go out but no response comes back
    pub fail_query_responses: bool,
    /// Peers that cannot be reached at all
    pub unreachable: HashSet<NodeAddress>,
    /// Addresses `add_peer` refuses
    pub invalid_peers: HashSet<NodeAddress>,
}

/// How many calls of each kind reached the substrate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubstrateCounters {
    pub connection_requests: u64,
    pub sends: u64,
    pub closes: u64,
    pub queries: u64,
    pub peer_requests: u64,
}

struct SubstrateState {
    address: Option<NodeAddress>,
    peers: BTreeMap<NodeAddress, Vec<String>>,
    connections: Vec<Connection>,
    messages: Vec<DataMessage>,
    next_seq: HashMap<ConnectionId, u64>,
    next_conn: u64,
    gossip: HashMap<NodeAddress, Vec<NodeAddress>>,
    faults: FaultPlan,
    counters: SubstrateCounters,
    rng: ChaCha8Rng,
}

impl SubstrateState {
    fn me(&self) -> Result<NodeAddress, EnvError> {
        self.address
            .clone()
            .ok_or_else(|| EnvError::network("transport not listening"))
    }

    fn connection_mut(&mut self, id: ConnectionId) -> Result<&mut Connection, EnvError> {
        self.connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| EnvError::UnknownConnection(id.to_string()))
    }

    fn fresh_id(&mut self) -> ConnectionId {
        self.next_conn += 1;
        ConnectionId::from_seq(self.next_conn)
    }
}

/// Network addresses embedded in a full address: the part before `/p2p/`.
fn network_addrs_of(addr: &NodeAddress) -> Vec<String> {
    match addr.as_str().split_once("/p2p/") {
        Some((net, _)) if !net.is_empty() => vec![net.to_string()],
        Some(_) => Vec::new(),
        None => vec![addr.to_string()],
    }
}

/// Loopback substrate: a single process-local view of the network.
pub struct MemorySubstrate {
    state: Mutex<SubstrateState>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl MemorySubstrate {
    /// A substrate whose transport is not listening yet.
    pub fn new(seed: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(SubstrateState {
                address: None,
                peers: BTreeMap::new(),
                connections: Vec::new(),
                messages: Vec::new(),
                next_seq: HashMap::new(),
                next_conn: 0,
                gossip: HashMap::new(),
                faults: FaultPlan::default(),
                counters: SubstrateCounters::default(),
                rng: ChaCha8Rng::seed_from_u64(seed),
            }),
            events,
        }
    }

    /// A substrate already listening on `address`.
    pub fn listening(address: impl Into<NodeAddress>, seed: u64) -> Self {
        let substrate = Self::new(seed);
        substrate.bring_up(address);
        substrate
    }

    fn state(&self) -> MutexGuard<'_, SubstrateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ConnectionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Starts listening; `full_address` returns `address` from now on.
    pub fn bring_up(&self, address: impl Into<NodeAddress>) {
        self.state().address = Some(address.into());
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        self.state().faults = faults;
    }

    /// Peers `peer` will hand out when asked directly.
    pub fn set_gossip(&self, peer: impl Into<NodeAddress>, known: Vec<NodeAddress>) {
        self.state().gossip.insert(peer.into(), known);
    }

    /// Adds a peer with an explicit set of network addresses.
    pub fn add_peer_with_addrs(&self, peer: impl Into<NodeAddress>, network_addrs: Vec<String>) {
        self.state().peers.insert(peer.into(), network_addrs);
    }

    /// Persists a connection as-is, bypassing request/accept.
    pub fn insert_connection(&self, conn: Connection) {
        self.state().connections.push(conn);
    }

    /// The remote side opens a connection to this node.
    pub fn accept_inbound(&self, from: impl Into<NodeAddress>) -> Result<ConnectionId, EnvError> {
        let conn = {
            let mut state = self.state();
            let me = state.me()?;
            let id = state.fresh_id();
            let conn = Connection {
                id,
                sender: from.into(),
                receiver: me,
                status: ConnectionStatus::Open,
            };
            state.connections.push(conn.clone());
            conn
        };
        let id = conn.id;
        self.publish(ConnectionEvent::Opened(conn));
        Ok(id)
    }

    /// The remote side tears a connection down.
    pub fn teardown_remote(&self, id: ConnectionId) -> Result<(), EnvError> {
        {
            let mut state = self.state();
            let conn = state.connection_mut(id)?;
            conn.status = ConnectionStatus::Closed;
        }
        self.publish(ConnectionEvent::Closed(id));
        Ok(())
    }

    pub fn counters(&self) -> SubstrateCounters {
        self.state().counters
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.state().connections.clone()
    }

    pub fn messages(&self) -> Vec<DataMessage> {
        self.state().messages.clone()
    }
}

#[async_trait]
impl ConnectionService for MemorySubstrate {
    fn full_address(&self) -> Option<NodeAddress> {
        self.state().address.clone()
    }

    async fn add_peer(&self, addr: &NodeAddress) -> Result<(), EnvError> {
        let mut state = self.state();
        if addr.is_empty() || state.faults.invalid_peers.contains(addr) {
            return Err(EnvError::InvalidAddress(addr.to_string()));
        }
        if state.address.as_ref() == Some(addr) {
            return Ok(());
        }
        state
            .peers
            .entry(addr.clone())
            .or_insert_with(|| network_addrs_of(addr));
        Ok(())
    }

    fn peer_count(&self) -> usize {
        let state = self.state();
        state.peers.len() + usize::from(state.address.is_some())
    }

    fn known_peers(&self) -> Vec<KnownPeer> {
        self.state()
            .peers
            .iter()
            .map(|(address, network_addrs)| KnownPeer {
                address: address.clone(),
                network_addrs: network_addrs.clone(),
            })
            .collect()
    }

    async fn request_connection(&self, peer: &NodeAddress) -> Result<ConnectionId, EnvError> {
        let conn = {
            let mut state = self.state();
            state.counters.connection_requests += 1;
            let me = state.me()?;
            if !state.peers.contains_key(peer) || state.faults.unreachable.contains(peer) {
                return Err(EnvError::unreachable(peer));
            }
            let id = state.fresh_id();
            if state.faults.reject_connections {
                state.connections.push(Connection {
                    id,
                    sender: me,
                    receiver: peer.clone(),
                    status: ConnectionStatus::Rejected,
                });
                return Err(EnvError::network(format!("{peer} rejected connection {id}")));
            }
            let conn = Connection {
                id,
                sender: me,
                receiver: peer.clone(),
                status: ConnectionStatus::Open,
            };
            state.connections.push(conn.clone());
            conn
        };
        let id = conn.id;
        self.publish(ConnectionEvent::Opened(conn));
        Ok(id)
    }

    async fn close_connection(&self, id: ConnectionId) -> Result<(), EnvError> {
        {
            let mut state = self.state();
            state.counters.closes += 1;
            let fail = state.faults.fail_closes;
            let conn = state.connection_mut(id)?;
            conn.ensure_status(ConnectionStatus::Open)?;
            if fail {
                return Err(EnvError::network(format!("close of {id} timed out")));
            }
            conn.status = ConnectionStatus::Closed;
        }
        self.publish(ConnectionEvent::Closed(id));
        Ok(())
    }

    async fn send_data(&self, id: ConnectionId, payload: Vec<u8>) -> Result<(), EnvError> {
        let mut state = self.state();
        state.counters.sends += 1;
        let fail = state.faults.fail_sends;
        let conn = state.connection_mut(id)?;
        conn.ensure_status(ConnectionStatus::Open)?;
        if fail {
            return Err(EnvError::network(format!("send on {id} failed")));
        }
        let seq = state.next_seq.entry(id).or_insert(0);
        *seq += 1;
        let seq_no = *seq;
        state.messages.push(DataMessage {
            conn_id: id,
            seq_no,
            payload,
        });
        Ok(())
    }

    async fn query_for_message(
        &self,
        peer: &NodeAddress,
        connection: &Connection,
        seq_no: u64,
    ) -> Result<QueryExchange, EnvError> {
        let mut state = self.state();
        state.counters.queries += 1;
        if !connection.involves(peer) {
            return Err(EnvError::unreachable(peer));
        }
        let query_bytes =
            QUERY_HEADER_BYTES + connection.sender.as_str().len() + connection.receiver.as_str().len();
        if state.faults.fail_query_responses || state.faults.unreachable.contains(peer) {
            return Ok(QueryExchange::failed(query_bytes, EnvError::network("no response")));
        }
        let response = state
            .messages
            .iter()
            .find(|m| m.conn_id == connection.id && m.seq_no == seq_no)
            .map(|m| m.payload.len())
            .ok_or_else(|| EnvError::store(format!("{peer} has no message {seq_no}")));
        Ok(QueryExchange {
            query_bytes,
            response,
        })
    }

    async fn request_peers(&self, peer: &NodeAddress, max: usize) -> Result<Vec<NodeAddress>, EnvError> {
        let mut state = self.state();
        state.counters.peer_requests += 1;
        if !state.peers.contains_key(peer) || state.faults.unreachable.contains(peer) {
            return Err(EnvError::unreachable(peer));
        }
        Ok(state
            .gossip
            .get(peer)
            .map(|known| known.iter().take(max).cloned().collect())
            .unwrap_or_default())
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl RecordStore for MemorySubstrate {
    async fn random_connection(&self, filter: &ConnectionFilter) -> Result<Option<Connection>, EnvError> {
        let mut state = self.state();
        let SubstrateState { connections, rng, .. } = &mut *state;
        let matching: Vec<&Connection> = connections.iter().filter(|c| filter.matches(c)).collect();
        Ok(matching.choose(rng).map(|c| (*c).clone()))
    }

    async fn count_connections(&self, filter: &ConnectionFilter) -> Result<usize, EnvError> {
        Ok(self.state().connections.iter().filter(|c| filter.matches(c)).count())
    }

    async fn random_message(&self) -> Result<Option<DataMessage>, EnvError> {
        let mut state = self.state();
        let SubstrateState { messages, rng, .. } = &mut *state;
        Ok(messages.choose(rng).cloned())
    }

    async fn connection(&self, id: ConnectionId) -> Result<Option<Connection>, EnvError> {
        Ok(self.state().connections.iter().find(|c| c.id == id).cloned())
    }
}
