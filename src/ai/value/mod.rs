//! Value functions: a lazily materialized Q-table and a trainable
//! approximator with experience replay, behind one [`ValueFunction`]
//! interface chosen once when the control loop is built.

mod approx;
mod network;
mod tabular;

use std::error::Error;
use std::fmt::Debug;
use std::path::Path;

use crate::ai::transition::{Transition, UpdateMetrics};
use crate::sim::AgentId;

pub use approx::{td_target, target_vector, ApproxConfig, ApproximateQ, Approximator};
pub use network::NetworkApproximator;
pub use tabular::{TabularConfig, TabularQ};

/// Uniform interface over the tabular and approximate variants.
pub trait ValueFunction {
    type State: Clone + Debug + Send + 'static;

    /// Display name ("TabularQ", "ApproximateQ").
    fn name(&self) -> &str;

    /// Dimensionality of the states this function accepts.
    fn state_dimension(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Per-action values for `(agent, state)`. Never fails: unseen keys
    /// yield zeros (tabular) or the untrained prediction (approximate).
    fn predict(&mut self, agent: &AgentId, state: &Self::State) -> Vec<f32>;

    /// Consume one transition. The tabular variant updates in place and
    /// returns its metrics; the approximate variant stores it for replay.
    fn update(&mut self, transition: Transition<Self::State>) -> Option<UpdateMetrics>;

    /// Run deferred training (replay). `None` when nothing was trained.
    fn train(&mut self) -> Option<UpdateMetrics>;

    /// Number of training updates applied so far.
    fn update_count(&self) -> usize;

    /// Overwrite the update counter, e.g. from checkpoint metadata.
    fn set_update_count(&mut self, updates: usize);

    /// Immutable copy of the inspectable contents.
    fn snapshot(&self) -> ValueSnapshot;

    fn save_to_dir(&self, dir: &Path) -> Result<(), Box<dyn Error>>;

    fn load_from_dir(&mut self, dir: &Path) -> Result<(), Box<dyn Error>>;
}

/// Values recorded for one `(agent, state)` key.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRow {
    pub agent: AgentId,
    pub state: String,
    pub values: Vec<f32>,
}

/// Owned copy of a value function's contents, safe to hand to another thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueSnapshot {
    pub kind: String,
    pub rows: Vec<ValueRow>,
    pub updates: usize,
}

impl ValueSnapshot {
    pub fn rows_for<'a>(&'a self, agent: &'a AgentId) -> impl Iterator<Item = &'a ValueRow> + 'a {
        self.rows.iter().filter(move |row| &row.agent == agent)
    }
}
