#![allow(dead_code)]

use peersim_core::{ActionSource, MetricsAggregator, PeerCoordinator, Scheduler};
use peersim_env::{ConnectionService, NodeAddress};
use peersim_sim::{MemorySubstrate, ScriptedDirectory, SimContext};
use std::sync::Arc;
use std::time::Duration;

pub const ME: &str = "/ip4/10.0.0.1/tcp/4001/p2p/QmSelf";
pub const INTERVAL: Duration = Duration::from_secs(1);

pub type SimCoordinator = PeerCoordinator<SimContext, MemorySubstrate, MemorySubstrate, ScriptedDirectory>;

pub fn addr(s: &str) -> NodeAddress {
    NodeAddress::from(s)
}

pub fn peer(i: usize) -> NodeAddress {
    NodeAddress::new(format!("/ip4/10.0.0.{}/tcp/4001/p2p/QmPeer{i}", i + 1))
}

/// One node wired to simulated collaborators.
pub struct TestNode {
    pub ctx: Arc<SimContext>,
    pub substrate: Arc<MemorySubstrate>,
    pub directory: Arc<ScriptedDirectory>,
    pub metrics: Arc<MetricsAggregator>,
    pub me: NodeAddress,
}

impl TestNode {
    /// A listening node that already knows `peers`.
    pub async fn new(directory: ScriptedDirectory, peers: &[NodeAddress]) -> Self {
        let substrate = Arc::new(MemorySubstrate::listening(ME, 42));
        for p in peers {
            substrate.add_peer(p).await.unwrap();
        }
        Self {
            ctx: SimContext::shared(42),
            substrate,
            directory: Arc::new(directory),
            metrics: MetricsAggregator::shared(),
            me: addr(ME),
        }
    }

    pub fn coordinator(&self) -> SimCoordinator {
        PeerCoordinator::new(
            self.me.clone(),
            Arc::clone(&self.ctx),
            Arc::clone(&self.substrate),
            Arc::clone(&self.substrate),
            Arc::clone(&self.directory),
            Arc::clone(&self.metrics),
        )
    }

    pub fn scheduler<S: ActionSource>(
        &self,
        actions: S,
        total: u64,
    ) -> Scheduler<SimContext, MemorySubstrate, MemorySubstrate, ScriptedDirectory, S> {
        Scheduler::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.substrate),
            Arc::clone(&self.directory),
            self.coordinator(),
            actions,
            INTERVAL,
            total,
        )
    }
}
