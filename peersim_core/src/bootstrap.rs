//! Bootstrap protocol: get the node online and into the directory.
//!
//! ```text
//! WaitingForTransport -> Registering -> AccumulatingPeers -> Ready
//! ```
//!
//! Only registration can fail. Waiting and accumulating have no upper
//! bound and rely on the transport and the directory eventually
//! delivering.

use peersim_env::{ConnectionService, NodeAddress, NodeContext};
use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::coordinator::context_rng;
use crate::directory::{discover_peers, Directory};
use crate::error::CoreError;

/// How often to check whether the transport is listening.
pub const TRANSPORT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Jittered pause between two peer discovery rounds, in milliseconds.
pub const PEER_BACKOFF_MS: RangeInclusive<u64> = 500..=1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    WaitingForTransport,
    Registering,
    AccumulatingPeers,
    Ready,
}

impl fmt::Display for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BootstrapState::WaitingForTransport => "waiting_for_transport",
            BootstrapState::Registering => "registering",
            BootstrapState::AccumulatingPeers => "accumulating_peers",
            BootstrapState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// What bootstrap established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub address: NodeAddress,
    /// Discovery rounds it took to reach the peer threshold
    pub discovery_rounds: u64,
    /// Local peer set size at the end, counting this node
    pub peer_count: usize,
}

fn peer_backoff<R: Rng>(rng: &mut R) -> Duration {
    Duration::from_millis(rng.gen_range(PEER_BACKOFF_MS))
}

/// True once a peer set of `peer_count` (this node included) holds
/// `min_peer_count` peers besides this node.
fn threshold_reached(peer_count: usize, min_peer_count: usize) -> bool {
    peer_count.saturating_sub(1) >= min_peer_count
}

pub struct Bootstrap<Ctx, Conn, Dir>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Dir: Directory,
{
    context: Arc<Ctx>,
    connections: Arc<Conn>,
    directory: Arc<Dir>,
    target_peer_count: usize,
    min_peer_count: usize,
    state: BootstrapState,
}

impl<Ctx, Conn, Dir> Bootstrap<Ctx, Conn, Dir>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Dir: Directory,
{
    pub fn new(context: Arc<Ctx>, connections: Arc<Conn>, directory: Arc<Dir>, config: &ScheduleConfig) -> Self {
        Self {
            context,
            connections,
            directory,
            target_peer_count: config.target_peer_count,
            min_peer_count: config.min_peer_count,
            state: BootstrapState::WaitingForTransport,
        }
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    fn enter(&mut self, state: BootstrapState) {
        debug!(from = %self.state, to = %state, "Bootstrap transition");
        self.state = state;
    }

    /// Runs every state to `Ready`.
    pub async fn run(&mut self) -> Result<BootstrapReport, CoreError> {
        let address = self.wait_for_transport().await;
        info!(addr = %address, "Node is now up and running");

        self.enter(BootstrapState::Registering);
        self.directory
            .register(&address)
            .await
            .map_err(CoreError::Registration)?;
        info!("Registered with directory");

        self.enter(BootstrapState::AccumulatingPeers);
        let discovery_rounds = self.accumulate_peers(&address).await;

        self.enter(BootstrapState::Ready);
        let peer_count = self.connections.peer_count();
        info!(peers = peer_count, rounds = discovery_rounds, "Bootstrap complete");
        Ok(BootstrapReport {
            address,
            discovery_rounds,
            peer_count,
        })
    }

    async fn wait_for_transport(&self) -> NodeAddress {
        loop {
            if let Some(addr) = self.connections.full_address().filter(|a| !a.is_empty()) {
                return addr;
            }
            self.context.sleep(TRANSPORT_POLL_INTERVAL).await;
        }
    }

    fn has_enough_peers(&self) -> bool {
        threshold_reached(self.connections.peer_count(), self.min_peer_count)
    }

    async fn accumulate_peers(&self, me: &NodeAddress) -> u64 {
        let mut rounds = 0;
        while !self.has_enough_peers() {
            rounds += 1;
            match discover_peers(
                self.directory.as_ref(),
                self.connections.as_ref(),
                me,
                self.target_peer_count,
            )
            .await
            {
                Ok(added) => debug!(round = rounds, added, "Discovery round finished"),
                Err(e) => warn!(round = rounds, "Failed to fetch peers: {}", e),
            }
            if self.has_enough_peers() {
                break;
            }
            let pause = peer_backoff(&mut context_rng(self.context.as_ref()));
            self.context.sleep(pause).await;
        }
        rounds
    }
}
