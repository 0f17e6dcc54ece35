mod common;

use common::{peer, TestNode, INTERVAL};
use peersim_core::{Action, ActionTable, BigDecimal, RandomActions, TickOutcome};
use peersim_env::ConnectionStatus;
use peersim_sim::{FaultPlan, ScriptedActions, ScriptedDirectory};
use std::time::Duration;

#[tokio::test]
async fn test_send_without_connection_is_noop_then_drains() {
    let node = TestNode::new(ScriptedDirectory::new(), &[peer(1)]).await;

    let report = node
        .scheduler(ScriptedActions::new([Action::SendData]), 1)
        .run(async {})
        .await;

    assert_eq!(report.ticks.len(), 1);
    assert_eq!(report.ticks[0].action, Action::SendData);
    assert!(matches!(report.ticks[0].outcome, TickOutcome::Skipped(_)));

    assert_eq!(node.metrics.message_stat().count(), 0);
    assert_eq!(node.metrics.connection_count(), 0);
    assert_eq!(node.substrate.counters().sends, 0);

    assert!(report.reported);
    let reports = node.directory.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].message_count, 0);
    assert_eq!(reports[0].discovered_peer_count, 1);
}

#[tokio::test]
async fn test_connect_send_close_records_full_lifecycle() {
    let directory = ScriptedDirectory::new().with_random_peers(vec![peer(1)]);
    let node = TestNode::new(directory, &[peer(1)]).await;

    let report = node
        .scheduler(
            ScriptedActions::new([Action::Connect, Action::SendData, Action::CloseConnection]),
            3,
        )
        .run(async {})
        .await;

    assert_eq!(report.count(|o| *o == TickOutcome::Completed), 3);

    assert_eq!(node.metrics.connection_count(), 1);
    let conn = &node.substrate.connections()[0];
    assert_eq!(conn.status, ConnectionStatus::Closed);

    let record = node.metrics.connection_record(conn.id).unwrap();
    let close = record.close_time.expect("close time set");
    assert!(close > record.open_time);
    assert_eq!(close - record.open_time, 2 * INTERVAL);

    assert_eq!(node.metrics.message_stat().count(), 1);
    assert_eq!(report.summary.message_count, 1);
    assert_eq!(report.summary.connection_count, 1);
    assert_eq!(
        report.summary.average_connection_duration_nanos,
        nanos(2 * INTERVAL)
    );
}

fn nanos(d: Duration) -> BigDecimal {
    BigDecimal::from(d.as_nanos() as u64)
}

#[tokio::test]
async fn test_failed_report_does_not_stop_the_run() {
    let node = TestNode::new(ScriptedDirectory::new().failing_reports(), &[]).await;

    let report = node
        .scheduler(ScriptedActions::new([Action::Idle, Action::Idle]), 2)
        .run(async {})
        .await;

    assert_eq!(report.ticks.len(), 2);
    assert!(!report.reported);
    assert_eq!(node.directory.calls().report_metrics, 1);
}

#[tokio::test]
async fn test_failed_action_does_not_abort_later_ticks() {
    let directory = ScriptedDirectory::new().with_random_peers(vec![peer(1)]);
    let node = TestNode::new(directory, &[peer(1)]).await;
    node.substrate.set_faults(FaultPlan {
        reject_connections: true,
        ..Default::default()
    });

    let report = node
        .scheduler(ScriptedActions::new([Action::Connect, Action::Idle, Action::SendData]), 3)
        .run(async {})
        .await;

    assert!(matches!(report.ticks[0].outcome, TickOutcome::Failed(_)));
    assert_eq!(report.ticks[1].outcome, TickOutcome::Completed);
    assert!(matches!(report.ticks[2].outcome, TickOutcome::Skipped(_)));
    assert_eq!(node.metrics.connection_count(), 0);
}

#[tokio::test]
async fn test_interval_is_fixed_per_tick() {
    let node = TestNode::new(ScriptedDirectory::new(), &[]).await;
    node.scheduler(ScriptedActions::default(), 5).run(async {}).await;
    assert_eq!(node.ctx.slept(), 5 * INTERVAL);
}

#[tokio::test]
async fn test_idle_waits_for_shutdown_signal() {
    let node = TestNode::new(ScriptedDirectory::new(), &[]).await;
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let run = tokio::spawn(async move {
        node.scheduler(ScriptedActions::default(), 1)
            .run(async {
                let _ = rx.await;
            })
            .await
    });

    tokio::task::yield_now().await;
    assert!(!run.is_finished());
    tx.send(()).unwrap();
    let report = run.await.unwrap();
    assert_eq!(report.ticks.len(), 1);
}

#[tokio::test]
async fn test_seeded_random_run_keeps_metrics_consistent() {
    let peers: Vec<_> = (1..=4).map(peer).collect();
    let directory = ScriptedDirectory::new().with_random_peers(peers.clone());
    let node = TestNode::new(directory, &peers).await;
    let actions = RandomActions::seeded(&ActionTable::uniform(), 42).unwrap();

    let report = node.scheduler(actions, 300).run(async {}).await;

    assert_eq!(report.ticks.len(), 300);
    assert_eq!(report.count(|o| matches!(o, TickOutcome::Failed(_))), 0);

    let opened = node
        .substrate
        .connections()
        .iter()
        .filter(|c| c.sender == node.me)
        .count();
    assert_eq!(report.summary.connection_count, opened);
    assert_eq!(report.summary.message_count as usize, node.substrate.messages().len());
    assert_eq!(
        report.summary.query_count as usize,
        report
            .ticks
            .iter()
            .filter(|t| t.action == Action::Query && t.outcome == TickOutcome::Completed)
            .count()
    );
}
