//! Action Scheduler - the node's main control loop.
//!
//! ```text
//! Running(0) -> Running(1) -> ... -> Running(N-1) -> Draining -> Idle
//! ```
//!
//! Each `Running` tick sleeps the fixed action interval (no jitter),
//! draws one action and runs it to completion. Failures are logged and
//! never stop the loop. `Draining` reports the metrics summary once;
//! `Idle` waits for the shutdown signal.

use peersim_env::{ConnectionService, NodeContext, RecordStore};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::actions::{Action, ActionSource};
use crate::coordinator::{ActionOutcome, PeerCoordinator};
use crate::directory::Directory;
use crate::metrics::MetricsSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Running(u64),
    Draining,
    Idle,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::Running(i) => write!(f, "running({i})"),
            SchedulerState::Draining => f.write_str("draining"),
            SchedulerState::Idle => f.write_str("idle"),
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickRecord {
    pub tick: u64,
    pub action: Action,
    pub outcome: TickOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Skipped(&'static str),
    Failed(String),
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub ticks: Vec<TickRecord>,
    pub summary: MetricsSummary,
    /// Whether the directory accepted the summary
    pub reported: bool,
}

impl RunReport {
    pub fn count(&self, pred: impl Fn(&TickOutcome) -> bool) -> usize {
        self.ticks.iter().filter(|t| pred(&t.outcome)).count()
    }
}

pub struct Scheduler<Ctx, Conn, Store, Dir, Src>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Store: RecordStore,
    Dir: Directory,
    Src: ActionSource,
{
    context: Arc<Ctx>,
    connections: Arc<Conn>,
    directory: Arc<Dir>,
    coordinator: PeerCoordinator<Ctx, Conn, Store, Dir>,
    actions: Src,
    interval: Duration,
    total_actions: u64,
    state: SchedulerState,
}

impl<Ctx, Conn, Store, Dir, Src> Scheduler<Ctx, Conn, Store, Dir, Src>
where
    Ctx: NodeContext,
    Conn: ConnectionService,
    Store: RecordStore,
    Dir: Directory,
    Src: ActionSource,
{
    pub fn new(
        context: Arc<Ctx>,
        connections: Arc<Conn>,
        directory: Arc<Dir>,
        coordinator: PeerCoordinator<Ctx, Conn, Store, Dir>,
        actions: Src,
        interval: Duration,
        total_actions: u64,
    ) -> Self {
        Self {
            context,
            connections,
            directory,
            coordinator,
            actions,
            interval,
            total_actions,
            state: SchedulerState::Running(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn enter(&mut self, state: SchedulerState) {
        debug!(from = %self.state, to = %state, "Scheduler transition");
        self.state = state;
    }

    /// Runs one tick: sleep, draw, dispatch.
    async fn tick(&mut self, i: u64) -> TickRecord {
        self.context.sleep(self.interval).await;
        let action = self.actions.next_action();
        debug!(tick = i, action = %action, "Dispatching");

        let outcome = match self.coordinator.dispatch(action).await {
            Ok(ActionOutcome::Completed) => TickOutcome::Completed,
            Ok(ActionOutcome::Skipped(reason)) => TickOutcome::Skipped(reason),
            Err(e) => {
                error!(tick = i, action = %action, "Action failed: {}", e);
                TickOutcome::Failed(e.to_string())
            }
        };
        TickRecord {
            tick: i,
            action,
            outcome,
        }
    }

    /// Runs every tick, reports, then idles until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let mut ticks = Vec::with_capacity(self.total_actions.min(4_096) as usize);
        for i in 0..self.total_actions {
            self.enter(SchedulerState::Running(i));
            ticks.push(self.tick(i).await);
        }
        info!(actions = self.total_actions, "Scheduled actions finished");

        self.enter(SchedulerState::Draining);
        let summary = self.coordinator.metrics().summarize(
            self.coordinator.node_address().clone(),
            self.connections.peer_count().saturating_sub(1),
            self.context.now(),
        );
        let reported = match self.directory.report_metrics(&summary).await {
            Ok(()) => {
                info!("Reported metrics to directory");
                true
            }
            Err(e) => {
                error!("Error while sending metrics: {}", e);
                false
            }
        };

        self.enter(SchedulerState::Idle);
        info!("Idling until interrupted");
        shutdown.await;
        info!("Shutdown signal received");

        RunReport {
            ticks,
            summary,
            reported,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SchedulerState::Running(3).to_string(), "running(3)");
        assert_eq!(SchedulerState::Draining.to_string(), "draining");
    }

    #[test]
    fn test_report_count() {
        let report = RunReport {
            ticks: vec![
                TickRecord { tick: 0, action: Action::Idle, outcome: TickOutcome::Completed },
                TickRecord { tick: 1, action: Action::SendData, outcome: TickOutcome::Skipped("x") },
            ],
            summary: crate::metrics::MetricsAggregator::new().summarize("n".into(), 0, Duration::ZERO),
            reported: true,
        };
        assert_eq!(report.count(|o| matches!(o, TickOutcome::Skipped(_))), 1);
    }
}
