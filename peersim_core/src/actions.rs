//! The schedulable actions and how the scheduler draws them.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One thing the node can do in a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Connect,
    SendData,
    CloseConnection,
    Query,
    RequestPeers,
    Idle,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 6] = [
        Action::Connect,
        Action::SendData,
        Action::CloseConnection,
        Action::Query,
        Action::RequestPeers,
        Action::Idle,
    ];

    /// Returns the action name used in config and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Connect => "connect",
            Action::SendData => "sendData",
            Action::CloseConnection => "closeConnection",
            Action::Query => "query",
            Action::RequestPeers => "requestPeers",
            Action::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Relative weight per action. Actions absent from the table never run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTable(BTreeMap<Action, u32>);

impl ActionTable {
    /// Every action with weight 1.
    pub fn uniform() -> Self {
        Self(Action::ALL.iter().map(|a| (*a, 1)).collect())
    }

    /// Builds a table from explicit weights.
    pub fn from_weights(weights: impl IntoIterator<Item = (Action, u32)>) -> Self {
        Self(weights.into_iter().collect())
    }

    /// Weight of `action` (0 if absent).
    pub fn weight(&self, action: Action) -> u32 {
        self.0.get(&action).copied().unwrap_or(0)
    }

    /// Actions with a non-zero weight.
    pub fn enabled(&self) -> impl Iterator<Item = (Action, u32)> + '_ {
        self.0.iter().filter(|(_, w)| **w > 0).map(|(a, w)| (*a, *w))
    }

    /// True if no action can ever be drawn.
    pub fn is_disabled(&self) -> bool {
        self.enabled().next().is_none()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Where the scheduler gets its next action from.
pub trait ActionSource: Send {
    fn next_action(&mut self) -> Action;
}

/// Draws actions from an [`ActionTable`] with a discrete distribution.
pub struct RandomActions<R: Rng + Send> {
    actions: Vec<Action>,
    dist: WeightedIndex<u32>,
    rng: R,
}

impl<R: Rng + Send> RandomActions<R> {
    /// Returns `None` if the table has no enabled action.
    pub fn new(table: &ActionTable, rng: R) -> Option<Self> {
        let (actions, weights): (Vec<_>, Vec<_>) = table.enabled().unzip();
        let dist = WeightedIndex::new(weights).ok()?;
        Some(Self { actions, dist, rng })
    }
}

impl RandomActions<ChaCha8Rng> {
    /// Seeded draw sequence; seed 0 means seed from OS entropy.
    pub fn seeded(table: &ActionTable, seed: u64) -> Option<Self> {
        let rng = if seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(seed)
        };
        Self::new(table, rng)
    }
}

impl<R: Rng + Send> ActionSource for RandomActions<R> {
    fn next_action(&mut self) -> Action {
        self.actions[self.dist.sample(&mut self.rng)]
    }
}
