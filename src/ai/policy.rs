use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ai::value::ValueFunction;
use crate::sim::AgentId;

/// Epsilon-greedy exploration settings.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub epsilon: f32,
    /// Multiplier applied by each [`EpsilonGreedy::decay`] call.
    pub decay: f32,
    pub epsilon_min: f32,
    /// Decay epsilon at every episode boundary of the control loop.
    pub decay_per_episode: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        PolicyConfig {
            epsilon: 0.1,
            decay: 0.995,
            epsilon_min: 0.01,
            decay_per_episode: true,
        }
    }
}

/// Epsilon-greedy action selector.
pub struct EpsilonGreedy {
    epsilon: f32,
    decay: f32,
    epsilon_min: f32,
    decay_per_episode: bool,
    rng: StdRng,
}

impl EpsilonGreedy {
    pub fn new(config: &PolicyConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        EpsilonGreedy {
            epsilon: config.epsilon,
            decay: config.decay,
            epsilon_min: config.epsilon_min,
            decay_per_episode: config.decay_per_episode,
            rng,
        }
    }

    /// Pick an action index from `values`: uniformly at random with
    /// probability epsilon, otherwise the first maximal index.
    pub fn select(&mut self, values: &[f32]) -> usize {
        assert!(!values.is_empty(), "No actions to choose from");
        if self.rng.random::<f32>() < self.epsilon {
            return self.rng.random_range(0..values.len());
        }
        argmax(values)
    }

    /// Query `value_function` for `(agent, state)` and select an action.
    /// Returns the action together with the values it was chosen from.
    pub fn select_action<V: ValueFunction>(
        &mut self,
        value_function: &mut V,
        agent: &AgentId,
        state: &V::State,
    ) -> (usize, Vec<f32>) {
        let values = value_function.predict(agent, state);
        (self.select(&values), values)
    }

    /// Multiply epsilon by the decay factor, not going below the floor.
    pub fn decay(&mut self) {
        if self.epsilon > self.epsilon_min {
            self.epsilon = (self.epsilon * self.decay).max(self.epsilon_min);
        }
    }

    /// Whether the control loop should call [`EpsilonGreedy::decay`] at
    /// episode boundaries.
    pub fn decays_per_episode(&self) -> bool {
        self.decay_per_episode
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Set epsilon directly (e.g. 0.0 for pure greedy inference).
    pub fn set_epsilon(&mut self, epsilon: f32) {
        self.epsilon = epsilon;
    }
}

/// Index of the largest value; ties go to the lowest index.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}
