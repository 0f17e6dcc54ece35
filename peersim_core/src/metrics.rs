//! Metrics Aggregator
//! ==================
//!
//! Process-wide outcome statistics for one node:
//! - **Connection durations**: one record per connection this node opened
//! - **Message sizes**: running mean over every payload sent
//! - **Query sizes**: paired running means of query and response bytes
//!
//! One aggregator is built per process and shared by `Arc` between the
//! scheduler's actions and the substrate's event listener. Each family
//! has its own lock and every read-modify-write happens under it.

use bigdecimal::BigDecimal;
use peersim_env::{ConnectionEvent, ConnectionId, NodeAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::stats::RunningStat;

/// Open/close timestamps of one connection, as offsets on the node clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionMetricRecord {
    pub open_time: Duration,
    pub close_time: Option<Duration>,
}

impl ConnectionMetricRecord {
    /// Closed duration, or time accrued so far if still open.
    pub fn duration(&self, now: Duration) -> Duration {
        let end = self.close_time.unwrap_or(now);
        end.checked_sub(self.open_time)
            .unwrap_or_else(|| self.open_time - end)
    }
}

#[derive(Debug, Default)]
struct QueryStats {
    query: RunningStat,
    response: RunningStat,
}

/// Snapshot reported to the directory once the scheduler drains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    #[serde(rename = "nodeId")]
    pub node_address: NodeAddress,
    #[serde(rename = "numConnections")]
    pub connection_count: usize,
    #[serde(rename = "avgDurationNanos")]
    pub average_connection_duration_nanos: BigDecimal,
    #[serde(rename = "numMessages")]
    pub message_count: u64,
    #[serde(rename = "avgMessageSize")]
    pub average_message_size: BigDecimal,
    #[serde(rename = "numQueries")]
    pub query_count: u64,
    #[serde(rename = "avgQuerySize")]
    pub average_query_size: BigDecimal,
    #[serde(rename = "avgRespSize")]
    pub average_response_size: BigDecimal,
    #[serde(rename = "numPeers")]
    pub discovered_peer_count: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn average_duration_nanos(
    connections: &HashMap<ConnectionId, ConnectionMetricRecord>,
    now: Duration,
) -> BigDecimal {
    if connections.is_empty() {
        return BigDecimal::from(0u32);
    }
    let total = connections.values().fold(BigDecimal::from(0u32), |acc, record| {
        let nanos = u64::try_from(record.duration(now).as_nanos()).unwrap_or(u64::MAX);
        acc + BigDecimal::from(nanos)
    });
    total / BigDecimal::from(connections.len() as u64)
}

/// Thread-safe aggregate of every outcome the node observes.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    connections: Mutex<HashMap<ConnectionId, ConnectionMetricRecord>>,
    messages: Mutex<RunningStat>,
    queries: Mutex<QueryStats>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an Arc-wrapped aggregator for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Starts the record for `id` at `at`.
    ///
    /// Returns false if a record already exists; the first open wins.
    pub fn record_connection_open(&self, id: ConnectionId, at: Duration) -> bool {
        let mut connections = lock(&self.connections);
        if connections.contains_key(&id) {
            return false;
        }
        connections.insert(
            id,
            ConnectionMetricRecord {
                open_time: at,
                close_time: None,
            },
        );
        true
    }

    /// Sets `CloseTime` on the record for `id` if it is not set yet.
    ///
    /// Returns true only when this call set it.
    pub fn record_connection_close(&self, id: ConnectionId, at: Duration) -> bool {
        let mut connections = lock(&self.connections);
        match connections.get_mut(&id) {
            Some(record) if record.close_time.is_none() => {
                record.close_time = Some(at);
                true
            }
            Some(_) => false,
            None => {
                warn!(conn = %id, "No existing connection data, will not update");
                false
            }
        }
    }

    /// Folds one sent payload size into the message statistic.
    pub fn record_message(&self, size: usize) {
        lock(&self.messages).record(size as u64);
    }

    /// Folds one query round trip into both query statistics together.
    pub fn record_query(&self, query_size: usize, response_size: usize) {
        let mut queries = lock(&self.queries);
        queries.query.record(query_size as u64);
        queries.response.record(response_size as u64);
    }

    /// Returns the record for `id`, if any.
    pub fn connection_record(&self, id: ConnectionId) -> Option<ConnectionMetricRecord> {
        lock(&self.connections).get(&id).copied()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.connections).len()
    }

    pub fn message_stat(&self) -> RunningStat {
        lock(&self.messages).clone()
    }

    /// Query and response statistics, read under one lock.
    pub fn query_stats(&self) -> (RunningStat, RunningStat) {
        let queries = lock(&self.queries);
        (queries.query.clone(), queries.response.clone())
    }

    /// Mean duration in nanoseconds over every record, open ones
    /// contributing their time so far. Zero when there are no records.
    pub fn average_connection_duration_nanos(&self, now: Duration) -> BigDecimal {
        average_duration_nanos(&lock(&self.connections), now)
    }

    /// Snapshots every statistic into a report.
    pub fn summarize(
        &self,
        node_address: NodeAddress,
        discovered_peer_count: usize,
        now: Duration,
    ) -> MetricsSummary {
        let (connection_count, average_connection_duration_nanos) = {
            let connections = lock(&self.connections);
            (connections.len(), average_duration_nanos(&connections, now))
        };
        let messages = self.message_stat();
        let (query, response) = self.query_stats();

        MetricsSummary {
            node_address,
            connection_count,
            average_connection_duration_nanos,
            message_count: messages.count(),
            average_message_size: messages.mean().clone(),
            query_count: query.count(),
            average_query_size: query.mean().clone(),
            average_response_size: response.mean().clone(),
            discovered_peer_count,
        }
    }

    /// Applies one substrate event.
    ///
    /// Opens are only tracked for connections `me` initiated.
    pub fn apply_event(&self, me: &NodeAddress, event: &ConnectionEvent, at: Duration) {
        match event {
            ConnectionEvent::Opened(conn) if &conn.sender == me => {
                if self.record_connection_open(conn.id, at) {
                    debug!(conn = %conn.id, "Recorded open from substrate event");
                }
            }
            ConnectionEvent::Opened(_) => {}
            ConnectionEvent::Closed(id) => {
                if self.record_connection_close(*id, at) {
                    debug!(conn = %id, "Recorded close from substrate event");
                }
            }
        }
    }
}

/// Feeds substrate events into `metrics` until the channel closes.
///
/// `now` supplies the timestamp for each event.
pub async fn record_events<F>(
    metrics: Arc<MetricsAggregator>,
    me: NodeAddress,
    mut events: broadcast::Receiver<ConnectionEvent>,
    now: F,
) where
    F: Fn() -> Duration + Send + 'static,
{
    loop {
        match events.recv().await {
            Ok(event) => metrics.apply_event(&me, &event, now()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Connection event listener lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
