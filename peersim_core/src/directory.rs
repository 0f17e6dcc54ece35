//! Directory service client.
//!
//! The directory is the central registry every node registers with,
//! discovers peers from, and reports its final metrics to.
//!
//! ```text
//! POST /peers                              {peer}          -> 200
//! GET  /peers?numPeers=N&requestor=Addr                    -> {peers: [..]}
//! GET  /peers/random?requestor=Addr                        -> {peer}
//! POST /metrics                            MetricsSummary  -> 200
//! ```

use async_trait::async_trait;
use peersim_env::{ConnectionService, NodeAddress};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::MetricsSummary;

/// Errors from a directory call.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Connection, timeout or body decoding failure
    #[error("Directory transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The directory answered with a non-2xx status
    #[error("Directory {endpoint} returned {status}")]
    Status { endpoint: &'static str, status: u16 },

    /// The directory could not satisfy the request
    #[error("Directory unavailable: {0}")]
    Unavailable(String),
}

/// Calls a node makes against the directory.
#[async_trait]
pub trait Directory: Send + Sync + 'static {
    /// Announces `node` to the directory.
    async fn register(&self, node: &NodeAddress) -> Result<(), DirectoryError>;

    /// Up to `count` peer addresses, excluding `requestor`.
    async fn fetch_peers(&self, requestor: &NodeAddress, count: usize) -> Result<Vec<NodeAddress>, DirectoryError>;

    /// One peer chosen by the directory, excluding `requestor`.
    async fn fetch_random_peer(&self, requestor: &NodeAddress) -> Result<NodeAddress, DirectoryError>;

    /// Sends the final metrics summary.
    async fn report_metrics(&self, summary: &MetricsSummary) -> Result<(), DirectoryError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPeerRequest {
    pub peer: NodeAddress,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PeerResponse {
    #[serde(alias = "Peer")]
    pub peer: NodeAddress,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListPeersResponse {
    #[serde(alias = "Peers", default)]
    pub peers: Vec<NodeAddress>,
}

fn check(endpoint: &'static str, status: StatusCode) -> Result<(), DirectoryError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(DirectoryError::Status {
            endpoint,
            status: status.as_u16(),
        })
    }
}

/// HTTP/JSON directory client.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    http: Client,
    base_url: String,
}

impl HttpDirectory {
    /// `directory` is either `host:port` or a full base URL.
    pub fn new(directory: &str) -> Self {
        Self::with_client(Client::new(), directory)
    }

    pub fn with_client(http: Client, directory: &str) -> Self {
        let trimmed = directory.trim().trim_end_matches('/');
        let base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        };
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn register(&self, node: &NodeAddress) -> Result<(), DirectoryError> {
        let resp = self
            .http
            .post(format!("{}/peers", self.base_url))
            .json(&AddPeerRequest { peer: node.clone() })
            .send()
            .await?;
        check("POST /peers", resp.status())
    }

    async fn fetch_peers(&self, requestor: &NodeAddress, count: usize) -> Result<Vec<NodeAddress>, DirectoryError> {
        let resp = self
            .http
            .get(format!("{}/peers", self.base_url))
            .query(&[("numPeers", count.to_string()), ("requestor", requestor.to_string())])
            .send()
            .await?;
        check("GET /peers", resp.status())?;
        let body: ListPeersResponse = resp.json().await?;
        Ok(body
            .peers
            .into_iter()
            .filter(|p| p != requestor && !p.is_empty())
            .take(count)
            .collect())
    }

    async fn fetch_random_peer(&self, requestor: &NodeAddress) -> Result<NodeAddress, DirectoryError> {
        let resp = self
            .http
            .get(format!("{}/peers/random", self.base_url))
            .query(&[("requestor", requestor.as_str())])
            .send()
            .await?;
        check("GET /peers/random", resp.status())?;
        let body: PeerResponse = resp.json().await?;
        if body.peer.is_empty() || &body.peer == requestor {
            return Err(DirectoryError::Unavailable("no other peer registered".into()));
        }
        Ok(body.peer)
    }

    async fn report_metrics(&self, summary: &MetricsSummary) -> Result<(), DirectoryError> {
        match serde_json::to_string(summary) {
            Ok(body) => info!("Serialized metrics: {}", body),
            Err(e) => debug!("Could not render metrics for logging: {}", e),
        }
        let resp = self
            .http
            .post(format!("{}/metrics", self.base_url))
            .json(summary)
            .send()
            .await?;
        check("POST /metrics", resp.status())
    }
}

/// Fetches up to `count` peers and adds each to the local peer set.
///
/// A peer that fails to add is logged and skipped. Returns how many
/// were added.
pub async fn discover_peers<D, C>(
    directory: &D,
    connections: &C,
    me: &NodeAddress,
    count: usize,
) -> Result<usize, DirectoryError>
where
    D: Directory + ?Sized,
    C: ConnectionService + ?Sized,
{
    let peers = directory.fetch_peers(me, count).await?;
    let mut added = 0;
    for peer in peers.iter().filter(|p| *p != me) {
        match connections.add_peer(peer).await {
            Ok(()) => added += 1,
            Err(e) => warn!(peer = %peer, "Failed to add peer: {}", e),
        }
    }
    debug!(fetched = peers.len(), added, "Peer discovery round");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsAggregator;
    use axum::extract::{Query, State};
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeDirectory {
        registered: Mutex<Vec<NodeAddress>>,
        reports: Mutex<Vec<serde_json::Value>>,
        peers: Vec<NodeAddress>,
        reject_register: bool,
    }

    type Shared = Arc<FakeDirectory>;

    async fn register(State(dir): State<Shared>, Json(req): Json<AddPeerRequest>) -> AxumStatus {
        if dir.reject_register {
            return AxumStatus::INTERNAL_SERVER_ERROR;
        }
        dir.registered.lock().unwrap().push(req.peer);
        AxumStatus::OK
    }

    async fn list(
        State(dir): State<Shared>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        let n: usize = params["numPeers"].parse().unwrap();
        let requestor = NodeAddress::from(params["requestor"].as_str());
        // includes the requestor on purpose; the client must drop it
        let peers: Vec<_> = std::iter::once(requestor)
            .chain(dir.peers.iter().cloned())
            .take(n + 1)
            .collect();
        Json(serde_json::json!({ "peers": peers }))
    }

    async fn random(
        State(dir): State<Shared>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<serde_json::Value> {
        assert!(params.contains_key("requestor"));
        Json(serde_json::json!({ "Peer": dir.peers[0] }))
    }

    async fn metrics(State(dir): State<Shared>, Json(body): Json<serde_json::Value>) -> AxumStatus {
        dir.reports.lock().unwrap().push(body);
        AxumStatus::OK
    }

    async fn serve(dir: Shared) -> String {
        let app = Router::new()
            .route("/peers", post(register).get(list))
            .route("/peers/random", get(random))
            .route("/metrics", post(metrics))
            .with_state(dir);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr.to_string()
    }

    fn fake(peers: &[&str]) -> Shared {
        Arc::new(FakeDirectory {
            peers: peers.iter().map(|p| NodeAddress::from(*p)).collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(HttpDirectory::new("dir:8080").base_url(), "http://dir:8080");
        assert_eq!(HttpDirectory::new("https://dir/").base_url(), "https://dir");
    }

    #[tokio::test]
    async fn test_register_posts_peer() {
        let dir = fake(&[]);
        let client = HttpDirectory::new(&serve(Arc::clone(&dir)).await);
        client.register(&"me".into()).await.unwrap();
        assert_eq!(*dir.registered.lock().unwrap(), vec![NodeAddress::from("me")]);
    }

    #[tokio::test]
    async fn test_register_non_2xx_is_error() {
        let dir = Arc::new(FakeDirectory {
            reject_register: true,
            ..Default::default()
        });
        let client = HttpDirectory::new(&serve(dir).await);
        let err = client.register(&"me".into()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_fetch_peers_excludes_self_and_caps_count() {
        let dir = fake(&["a", "b", "c"]);
        let client = HttpDirectory::new(&serve(dir).await);
        let peers = client.fetch_peers(&"me".into(), 2).await.unwrap();
        assert_eq!(peers, vec![NodeAddress::from("a"), NodeAddress::from("b")]);
    }

    #[tokio::test]
    async fn test_fetch_random_peer_accepts_capitalized_key() {
        let dir = fake(&["p1"]);
        let client = HttpDirectory::new(&serve(dir).await);
        assert_eq!(client.fetch_random_peer(&"me".into()).await.unwrap(), NodeAddress::from("p1"));
    }

    #[tokio::test]
    async fn test_report_metrics_posts_summary() {
        let dir = fake(&[]);
        let client = HttpDirectory::new(&serve(Arc::clone(&dir)).await);
        let metrics = MetricsAggregator::new();
        metrics.record_message(10);
        let summary = metrics.summarize("me".into(), 0, Duration::ZERO);
        client.report_metrics(&summary).await.unwrap();

        let reports = dir.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["nodeId"], "me");
        assert_eq!(reports[0]["numMessages"], 1);
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_transport_error() {
        let client = HttpDirectory::new("127.0.0.1:1");
        let err = client.register(&"me".into()).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Transport(_)));
    }
}
