//! Error types for the environment abstraction.

use thiserror::Error;

/// Errors raised by the connection substrate or the record store.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport-level failure (send failed, connection reset, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Target node is not reachable or not in the local peer set
    #[error("Node unreachable: {0}")]
    NodeUnreachable(String),

    /// The connection exists but cannot take the requested action
    #[error("Connection {id} is {status}")]
    InvalidConnectionState { id: String, status: String },

    /// No connection with that ID
    #[error("Unknown connection: {0}")]
    UnknownConnection(String),

    /// Record store query failed
    #[error("Store error: {0}")]
    StoreError(String),

    /// Peer address could not be parsed or added
    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unreachable error.
    pub fn unreachable(node: impl std::fmt::Display) -> Self {
        Self::NodeUnreachable(node.to_string())
    }

    /// Creates a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::StoreError(msg.into())
    }
}
