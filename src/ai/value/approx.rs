use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ValueFunction, ValueRow, ValueSnapshot};
use crate::ai::state_encoding::FeatureSource;
use crate::ai::transition::{Transition, UpdateMetrics};
use crate::sim::AgentId;
use crate::training::replay_buffer::ReplayBuffer;

/// A trainable map from a state vector to per-action values.
pub trait Approximator {
    fn input_size(&self) -> usize;

    fn num_actions(&self) -> usize;

    fn predict(&self, state: &[f32]) -> Vec<f32>;

    /// One gradient step toward `target` for input `state`. Returns the loss
    /// before the step.
    fn fit(&mut self, state: &[f32], target: &[f32]) -> f32;

    fn save_to_dir(&self, dir: &Path) -> Result<(), Box<dyn Error>>;

    fn load_from_dir(&mut self, dir: &Path) -> Result<(), Box<dyn Error>>;
}

/// Hyperparameters of the approximate value function and its replay memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApproxConfig {
    pub gamma: f32,
    pub learning_rate: f64,
    pub hidden_size: usize,
    /// Length of the encoded state vector.
    pub state_size: usize,
    pub features: FeatureSource,
    pub replay_capacity: usize,
    pub batch_size: usize,
}

impl Default for ApproxConfig {
    fn default() -> Self {
        ApproxConfig {
            gamma: 0.95,
            learning_rate: 0.001,
            hidden_size: 24,
            state_size: 4,
            features: FeatureSource::Congestion,
            replay_capacity: 2000,
            batch_size: 32,
        }
    }
}

/// `r` for terminal transitions, else `r + gamma * max(next_values)`.
pub fn td_target(reward: f32, gamma: f32, next_values: &[f32], done: bool) -> f32 {
    if done {
        return reward;
    }
    let max_next = next_values
        .iter()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    reward + gamma * max_next
}

/// Copy of `baseline` with only the `action` slot replaced by `target`.
pub fn target_vector(baseline: &[f32], action: usize, target: f32) -> Vec<f32> {
    let mut vector = baseline.to_vec();
    if let Some(slot) = vector.get_mut(action) {
        *slot = target;
    }
    vector
}

/// Q-learning over a function approximator with uniform experience replay.
///
/// Transitions are stored by [`ValueFunction::update`]; the approximator is
/// trained only by [`ApproximateQ::replay`].
pub struct ApproximateQ<M: Approximator> {
    model: M,
    memory: ReplayBuffer<Transition<Vec<f32>>>,
    gamma: f32,
    batch_size: usize,
    updates: usize,
    latest: BTreeMap<AgentId, (Vec<f32>, Vec<f32>)>,
}

impl<M: Approximator> ApproximateQ<M> {
    pub fn new(model: M, config: &ApproxConfig) -> Self {
        Self::with_memory(model, config, ReplayBuffer::new(config.replay_capacity))
    }

    pub fn with_seed(model: M, config: &ApproxConfig, seed: u64) -> Self {
        Self::with_memory(
            model,
            config,
            ReplayBuffer::with_seed(config.replay_capacity, seed),
        )
    }

    fn with_memory(
        model: M,
        config: &ApproxConfig,
        memory: ReplayBuffer<Transition<Vec<f32>>>,
    ) -> Self {
        ApproximateQ {
            model,
            memory,
            gamma: config.gamma,
            batch_size: config.batch_size,
            updates: 0,
            latest: BTreeMap::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    pub fn remember(&mut self, transition: Transition<Vec<f32>>) {
        self.memory.push(transition);
    }

    /// Fit target for one transition under the current model.
    pub fn fit_target(&self, transition: &Transition<Vec<f32>>) -> Vec<f32> {
        let next_values = if transition.done {
            Vec::new()
        } else {
            self.model.predict(&transition.next_state)
        };
        let target = td_target(transition.reward, self.gamma, &next_values, transition.done);
        let baseline = self.model.predict(&transition.state);
        target_vector(&baseline, transition.action, target)
    }

    /// Train on one uniformly sampled batch. Skipped (returns `None`) while
    /// the memory holds fewer than `batch_size` transitions.
    pub fn replay(&mut self) -> Option<UpdateMetrics> {
        if self.memory.len() < self.batch_size {
            return None;
        }
        let batch = self.memory.sample(self.batch_size);
        let mut total_loss = 0.0;
        for transition in &batch {
            let target = self.fit_target(transition);
            total_loss += self.model.fit(&transition.state, &target);
        }
        self.updates += 1;

        let metrics = UpdateMetrics {
            loss: total_loss / batch.len() as f32,
            samples: batch.len(),
        };
        debug!(
            loss = metrics.loss,
            samples = metrics.samples,
            memory = self.memory.len(),
            "replay batch trained"
        );
        Some(metrics)
    }
}

impl<M: Approximator> ValueFunction for ApproximateQ<M> {
    type State = Vec<f32>;

    fn name(&self) -> &str {
        "ApproximateQ"
    }

    fn state_dimension(&self) -> usize {
        self.model.input_size()
    }

    fn num_actions(&self) -> usize {
        self.model.num_actions()
    }

    fn predict(&mut self, agent: &AgentId, state: &Vec<f32>) -> Vec<f32> {
        let values = self.model.predict(state);
        self.latest
            .insert(agent.clone(), (state.clone(), values.clone()));
        values
    }

    fn update(&mut self, transition: Transition<Vec<f32>>) -> Option<UpdateMetrics> {
        self.remember(transition);
        None
    }

    fn train(&mut self) -> Option<UpdateMetrics> {
        self.replay()
    }

    fn update_count(&self) -> usize {
        self.updates
    }

    fn set_update_count(&mut self, updates: usize) {
        self.updates = updates;
    }

    /// The approximator cannot be enumerated; the snapshot holds the latest
    /// prediction made for each agent.
    fn snapshot(&self) -> ValueSnapshot {
        let rows = self
            .latest
            .iter()
            .map(|(agent, (state, values))| ValueRow {
                agent: agent.clone(),
                state: format_state(state),
                values: values.clone(),
            })
            .collect();
        ValueSnapshot {
            kind: self.name().to_string(),
            rows,
            updates: self.updates,
        }
    }

    fn save_to_dir(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        self.model.save_to_dir(dir)
    }

    fn load_from_dir(&mut self, dir: &Path) -> Result<(), Box<dyn Error>> {
        self.model.load_from_dir(dir)
    }
}

fn format_state(state: &[f32]) -> String {
    let parts: Vec<String> = state.iter().map(|v| format!("{v:.0}")).collect();
    format!("[{}]", parts.join(","))
}
