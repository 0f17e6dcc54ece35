//! Peersim Core - decision logic of a peer simulation node.
//!
//! The node exercises a peer-to-peer connection substrate with
//! randomized, scheduled actions and measures the outcomes:
//! 1. **Bootstrap**: wait for the transport, register, gather peers
//! 2. **Scheduler**: sleep, draw an action, run it, for a fixed count
//! 3. **Coordinator**: pick targets without duplicating open connections
//! 4. **Metrics**: arbitrary-precision running means, reported at the end

pub mod actions;
pub mod bootstrap;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod stats;

// Re-export key types for convenience
pub use actions::{Action, ActionSource, ActionTable, RandomActions};
pub use bootstrap::{Bootstrap, BootstrapReport, BootstrapState};
pub use config::{ConfigError, ScheduleConfig};
pub use coordinator::{ActionOutcome, PeerCoordinator};
pub use directory::{discover_peers, Directory, DirectoryError, HttpDirectory};
pub use error::CoreError;
pub use metrics::{record_events, ConnectionMetricRecord, MetricsAggregator, MetricsSummary};
pub use scheduler::{RunReport, Scheduler, SchedulerState, TickOutcome, TickRecord};
pub use stats::RunningStat;

pub use bigdecimal::BigDecimal;
