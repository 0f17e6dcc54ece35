//! Peer Simulation Environment Abstraction Layer
//!
//! This crate is the seam between the node's decision logic and the
//! outside world. The core never touches a socket, a database or the
//! system clock directly; it goes through:
//! - [`NodeContext`] for time (`now()`, `sleep()`) and task spawning
//! - [`ConnectionService`] for the peer transport and local peer set
//! - [`RecordStore`] for persisted connections and data messages
//!
//! Production wires [`TokioContext`] plus a real substrate; tests wire a
//! virtual clock and an in-memory substrate.
//!
//! # Example
//!
//! ```ignore
//! use peersim_env::{NodeContext, ConnectionService};
//!
//! async fn wait_for_transport<Ctx: NodeContext, Conn: ConnectionService>(
//!     ctx: &Ctx,
//!     conn: &Conn,
//! ) -> NodeAddress {
//!     loop {
//!         if let Some(addr) = conn.full_address() {
//!             return addr;
//!         }
//!         ctx.sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```

mod context;
mod connection;
mod store;
mod types;
mod error;
mod tokio_impl;

pub use context::NodeContext;
pub use connection::ConnectionService;
pub use store::{ConnectionFilter, RecordStore};
pub use types::{
    Connection, ConnectionEvent, ConnectionId, ConnectionStatus, DataMessage, KnownPeer,
    NodeAddress, QueryExchange,
};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
