//! Peersim Simulation Harness
//!
//! Deterministic stand-ins for everything around the core, so a whole
//! node run (bootstrap, scheduled actions, final report) executes in a
//! single process without a network or a real directory.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Scheduler                        │
//! │   SimContext (virtual clock)   ScriptedActions / Random  │
//! │                 │                                        │
//! │          PeerCoordinator ─────────► MetricsAggregator    │
//! │            │         │                     ▲             │
//! │  ScriptedDirectory  MemorySubstrate ── events ┘          │
//! │                    (ConnectionService + RecordStore)     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use peersim_sim::{SimContext, MemorySubstrate, ScriptedDirectory, ScriptedActions};
//!
//! let ctx = SimContext::shared(42);
//! let substrate = Arc::new(MemorySubstrate::listening("me", 42));
//! let directory = Arc::new(ScriptedDirectory::new().incremental(3));
//! ```

mod context;
mod scripted;
mod substrate;

pub use context::SimContext;
pub use scripted::{DirectoryCalls, ScriptedActions, ScriptedDirectory};
pub use substrate::{FaultPlan, MemorySubstrate, SubstrateCounters, QUERY_HEADER_BYTES};
