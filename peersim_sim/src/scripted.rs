//! Scripted collaborators: a directory and an action source whose
//! behavior is fixed up front.

use async_trait::async_trait;
use peersim_core::{Action, ActionSource, Directory, DirectoryError, MetricsSummary};
use peersim_env::NodeAddress;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Calls received per endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryCalls {
    pub register: u64,
    pub fetch_peers: u64,
    pub fetch_random_peer: u64,
    pub report_metrics: u64,
}

#[derive(Default)]
struct Script {
    fail_register: bool,
    fail_reports: bool,
    peer_batches: VecDeque<Vec<NodeAddress>>,
    random_peers: Vec<NodeAddress>,
    random_cursor: usize,
    registered: Vec<NodeAddress>,
    reports: Vec<MetricsSummary>,
    calls: DirectoryCalls,
}

/// Directory stand-in that replays scripted answers.
///
/// `fetch_peers` pops one batch per call (empty once exhausted);
/// `fetch_random_peer` cycles through its list.
#[derive(Default)]
pub struct ScriptedDirectory {
    script: Mutex<Script>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_peer_batches(self, batches: Vec<Vec<NodeAddress>>) -> Self {
        self.script().peer_batches = batches.into();
        self
    }

    /// One fresh peer (`peer-1`, `peer-2`, ...) per `fetch_peers` call.
    pub fn incremental(self, calls: usize) -> Self {
        let batches = (1..=calls)
            .map(|i| vec![NodeAddress::new(format!("peer-{i}"))])
            .collect();
        self.with_peer_batches(batches)
    }

    pub fn with_random_peers(self, peers: Vec<NodeAddress>) -> Self {
        self.script().random_peers = peers;
        self
    }

    pub fn failing_registration(self) -> Self {
        self.script().fail_register = true;
        self
    }

    pub fn failing_reports(self) -> Self {
        self.script().fail_reports = true;
        self
    }

    pub fn calls(&self) -> DirectoryCalls {
        self.script().calls
    }

    pub fn registered(&self) -> Vec<NodeAddress> {
        self.script().registered.clone()
    }

    pub fn reports(&self) -> Vec<MetricsSummary> {
        self.script().reports.clone()
    }
}

#[async_trait]
impl Directory for ScriptedDirectory {
    async fn register(&self, node: &NodeAddress) -> Result<(), DirectoryError> {
        let mut script = self.script();
        script.calls.register += 1;
        if script.fail_register {
            return Err(DirectoryError::Status {
                endpoint: "POST /peers",
                status: 503,
            });
        }
        script.registered.push(node.clone());
        Ok(())
    }

    async fn fetch_peers(&self, requestor: &NodeAddress, count: usize) -> Result<Vec<NodeAddress>, DirectoryError> {
        let mut script = self.script();
        script.calls.fetch_peers += 1;
        let batch = script.peer_batches.pop_front().unwrap_or_default();
        Ok(batch.into_iter().filter(|p| p != requestor).take(count).collect())
    }

    async fn fetch_random_peer(&self, requestor: &NodeAddress) -> Result<NodeAddress, DirectoryError> {
        let mut script = self.script();
        script.calls.fetch_random_peer += 1;
        let candidates: Vec<NodeAddress> = script
            .random_peers
            .iter()
            .filter(|p| *p != requestor)
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(DirectoryError::Unavailable("no other peer registered".into()));
        }
        let peer = candidates[script.random_cursor % candidates.len()].clone();
        script.random_cursor += 1;
        Ok(peer)
    }

    async fn report_metrics(&self, summary: &MetricsSummary) -> Result<(), DirectoryError> {
        let mut script = self.script();
        script.calls.report_metrics += 1;
        if script.fail_reports {
            return Err(DirectoryError::Status {
                endpoint: "POST /metrics",
                status: 500,
            });
        }
        script.reports.push(summary.clone());
        Ok(())
    }
}

/// Replays a fixed action sequence, then `Idle` forever.
#[derive(Debug, Clone, Default)]
pub struct ScriptedActions {
    queue: VecDeque<Action>,
}

impl ScriptedActions {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            queue: actions.into_iter().collect(),
        }
    }
}

impl ActionSource for ScriptedActions {
    fn next_action(&mut self) -> Action {
        self.queue.pop_front().unwrap_or(Action::Idle)
    }
}
