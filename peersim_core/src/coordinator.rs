//! Peer Coordinator - picks targets for each action and performs it.
//!
//! Every action here is single-shot: it either completes, is skipped
//! because there is nothing to act on, or fails with an error the
//! scheduler logs. Nothing is retried across ticks.

use peersim_env::{
    Connection, ConnectionFilter, ConnectionService, EnvError, NodeAddress, NodeContext, RecordStore,
};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::directory::Directory;
use crate::error::CoreError;
use crate::metrics::MetricsAggregator;

/// Random-peer draws per Connect action before giving up.
pub const MAX_CONNECT_ATTEMPTS: usize = 5;

/// Payload size range for SendData, in bytes.
pub const PAYLOAD_SIZE_BYTES: RangeInclusive<usize> = 1_000..=10_000;

/// Peers requested from a peer in one RequestPeers action.
pub const GOSSIP_PEER_LIMIT: usize = 10;

/// A short-lived RNG seeded from the context's draw.
pub fn context_rng<Ctx: NodeContext>(context: &Ctx) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(context.random_u64())
}

/// Uniform choice among `items`.
fn pick<T: Clone, R: Rng>(rng: &mut R, items: &[T]) -> Option<T> {
    items.choose(rng).cloned()
}

/// A payload of [`PAYLOAD_SIZE_BYTES`] length filled with random bytes.
pub fn random_payload<R: Rng>(rng: &mut R) -> Vec<u8> {
    let size = rng.gen_range(PAYLOAD_SIZE_BYTES);
    let mut payload = vec![0u8; size];
    rng.fill(payload.as_mut_slice());
    payload
}

/// Result of an action that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed,
    /// Nothing to act on this tick
    Skipped(&'static str),
}

/// Performs actions on behalf of one node.
pub struct PeerCoordinator<Ctx, Conn, Store, Dir>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Store: RecordStore,
    Dir: Directory,
{
    me: NodeAddress,
    context: Arc<Ctx>,
    connections: Arc<Conn>,
    store: Arc<Store>,
    directory: Arc<Dir>,
    metrics: Arc<MetricsAggregator>,
}

impl<Ctx, Conn, Store, Dir> PeerCoordinator<Ctx, Conn, Store, Dir>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Store: RecordStore,
    Dir: Directory,
{
    pub fn new(
        me: NodeAddress,
        context: Arc<Ctx>,
        connections: Arc<Conn>,
        store: Arc<Store>,
        directory: Arc<Dir>,
        metrics: Arc<MetricsAggregator>,
    ) -> Self {
        Self {
            me,
            context,
            connections,
            store,
            directory,
            metrics,
        }
    }

    pub fn node_address(&self) -> &NodeAddress {
        &self.me
    }

    pub fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Runs one action.
    pub async fn dispatch(&self, action: Action) -> Result<ActionOutcome, CoreError> {
        match action {
            Action::Connect => self.connect().await,
            Action::SendData => self.send_data().await,
            Action::CloseConnection => self.close_connection().await,
            Action::Query => self.query().await,
            Action::RequestPeers => self.request_peers().await,
            Action::Idle => Ok(ActionOutcome::Completed),
        }
    }

    /// True if an Open connection exists between this node and `peer`,
    /// in either direction.
    pub async fn has_open_connection(&self, peer: &NodeAddress) -> Result<bool, CoreError> {
        let outgoing = self
            .store
            .count_connections(&ConnectionFilter::open_between(&self.me, peer))
            .await?;
        if outgoing > 0 {
            return Ok(true);
        }
        let incoming = self
            .store
            .count_connections(&ConnectionFilter::open_between(peer, &self.me))
            .await?;
        Ok(incoming > 0)
    }

    /// Draws random peers from the directory until one has no open
    /// connection with this node, up to [`MAX_CONNECT_ATTEMPTS`] draws.
    pub async fn select_connect_target(&self) -> Result<Option<NodeAddress>, CoreError> {
        for attempt in 1..=MAX_CONNECT_ATTEMPTS {
            let candidate = match self.directory.fetch_random_peer(&self.me).await {
                Ok(peer) => peer,
                Err(e) => {
                    warn!(attempt, "Error while getting random peer: {}", e);
                    continue;
                }
            };
            if candidate == self.me {
                continue;
            }
            if self.has_open_connection(&candidate).await? {
                debug!(attempt, peer = %candidate, "Already connected, drawing again");
                continue;
            }
            return Ok(Some(candidate));
        }
        Ok(None)
    }

    /// Opens a connection to a collision-free random peer.
    pub async fn connect(&self) -> Result<ActionOutcome, CoreError> {
        let Some(peer) = self.select_connect_target().await? else {
            warn!(
                attempts = MAX_CONNECT_ATTEMPTS,
                "No peer without an open connection found, skipping connect"
            );
            return Ok(ActionOutcome::Skipped("every candidate already connected"));
        };

        let id = self.connections.request_connection(&peer).await?;
        self.metrics.record_connection_open(id, self.context.now());
        info!(peer = %peer, conn = %id, "Opened connection");
        Ok(ActionOutcome::Completed)
    }

    /// An open connection this node initiated, chosen by the store.
    pub async fn random_open_outgoing_connection(&self) -> Result<Option<Connection>, CoreError> {
        Ok(self
            .store
            .random_connection(&ConnectionFilter::open_outgoing(&self.me))
            .await?)
    }

    /// Sends a random-size payload of random bytes on an open connection.
    pub async fn send_data(&self) -> Result<ActionOutcome, CoreError> {
        let Some(conn) = self.random_open_outgoing_connection().await? else {
            info!("No open outgoing connection, skipping send");
            return Ok(ActionOutcome::Skipped("no open outgoing connection"));
        };

        let payload = random_payload(&mut context_rng(self.context.as_ref()));
        let size = payload.len();

        self.connections.send_data(conn.id, payload).await?;
        self.metrics.record_message(size);
        debug!(conn = %conn.id, size, "Sent data");
        Ok(ActionOutcome::Completed)
    }

    /// Closes an open connection this node initiated.
    pub async fn close_connection(&self) -> Result<ActionOutcome, CoreError> {
        let Some(conn) = self.random_open_outgoing_connection().await? else {
            info!("No open outgoing connection, skipping close");
            return Ok(ActionOutcome::Skipped("no open outgoing connection"));
        };

        self.connections.close_connection(conn.id).await?;
        self.metrics.record_connection_close(conn.id, self.context.now());
        info!(conn = %conn.id, peer = %conn.receiver, "Closed connection");
        Ok(ActionOutcome::Completed)
    }

    /// Re-requests a random persisted message from the other participant
    /// of its connection.
    ///
    /// A query whose response fails still counts: its query size is
    /// recorded with a zero-byte response.
    pub async fn query(&self) -> Result<ActionOutcome, CoreError> {
        let Some(message) = self.store.random_message().await? else {
            info!("No messages stored, skipping query");
            return Ok(ActionOutcome::Skipped("no stored messages"));
        };

        let conn = self
            .store
            .connection(message.conn_id)
            .await?
            .ok_or_else(|| EnvError::UnknownConnection(message.conn_id.to_string()))?;

        let peer = pick(
            &mut context_rng(self.context.as_ref()),
            &conn.participants_except(&self.me),
        );
        let Some(peer) = peer else {
            info!(conn = %conn.id, "No other participant to query");
            return Ok(ActionOutcome::Skipped("no other participant"));
        };

        let exchange = self
            .connections
            .query_for_message(&peer, &conn, message.seq_no)
            .await?;
        match exchange.response {
            Ok(response_bytes) => {
                self.metrics.record_query(exchange.query_bytes, response_bytes);
                debug!(peer = %peer, seq = message.seq_no, response_bytes, "Query answered");
                Ok(ActionOutcome::Completed)
            }
            Err(e) => {
                self.metrics.record_query(exchange.query_bytes, 0);
                Err(e.into())
            }
        }
    }

    /// Asks a random known peer for its peer list and adds the results.
    pub async fn request_peers(&self) -> Result<ActionOutcome, CoreError> {
        let peers: Vec<_> = self
            .connections
            .known_peers()
            .into_iter()
            .filter(|p| p.address != self.me)
            .collect();
        let Some(peer) = pick(&mut context_rng(self.context.as_ref()), &peers) else {
            info!("No known peers, skipping peer request");
            return Ok(ActionOutcome::Skipped("no known peers"));
        };
        if peer.network_addrs.is_empty() {
            info!(peer = %peer.address, "Peer has no known address, skipping peer request");
            return Ok(ActionOutcome::Skipped("peer has no known address"));
        }

        let found = self
            .connections
            .request_peers(&peer.address, GOSSIP_PEER_LIMIT)
            .await?;
        let mut added = 0usize;
        for addr in found.iter().filter(|a| **a != self.me) {
            match self.connections.add_peer(addr).await {
                Ok(()) => added += 1,
                Err(e) => warn!(peer = %addr, "Failed to add peer: {}", e),
            }
        }
        info!(from = %peer.address, received = found.len(), added, "Requested peers");
        Ok(ActionOutcome::Completed)
    }
}
