use std::fmt::Debug;

use burn::prelude::*;
use burn::tensor::TensorData;
use serde::{Deserialize, Serialize};

use crate::ai::observation::AgentObservation;

/// Maps an agent observation to the fixed-shape state a value function
/// consumes. Encoding is a pure function of the observation.
pub trait StateEncoder {
    type State: Clone + Debug + Send + 'static;

    /// Number of values in every encoded state.
    fn dimension(&self) -> usize;

    fn encode(&self, observation: &AgentObservation) -> Self::State;
}

/// Discretized state for the tabular value function: total congestion over
/// the agent's lanes, clamped to `[0, cap]`.
#[derive(Debug, Clone, Copy)]
pub struct TabularEncoder {
    cap: u32,
}

impl TabularEncoder {
    pub fn new(cap: u32) -> Self {
        TabularEncoder { cap }
    }
}

impl StateEncoder for TabularEncoder {
    type State = u32;

    fn dimension(&self) -> usize {
        1
    }

    fn encode(&self, observation: &AgentObservation) -> u32 {
        observation.total_congestion().min(self.cap)
    }
}

/// Which per-lane metric fills the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    #[default]
    Congestion,
    Vehicles,
}

/// Fixed-length feature vector for the approximate value function, one
/// feature per lane. Missing lanes are zero-padded and extra lanes are
/// truncated, so the output length is always `size`.
#[derive(Debug, Clone, Copy)]
pub struct VectorEncoder {
    size: usize,
    source: FeatureSource,
}

impl VectorEncoder {
    pub fn new(size: usize, source: FeatureSource) -> Self {
        VectorEncoder { size, source }
    }
}

impl StateEncoder for VectorEncoder {
    type State = Vec<f32>;

    fn dimension(&self) -> usize {
        self.size
    }

    fn encode(&self, observation: &AgentObservation) -> Vec<f32> {
        let raw = observation.lanes.iter().map(|lane| match self.source {
            FeatureSource::Congestion => lane.congestion as f32,
            FeatureSource::Vehicles => lane.vehicles as f32,
        });
        fit_to_size(raw, self.size)
    }
}

/// Collect `raw` into exactly `size` values, truncating or zero-padding.
pub fn fit_to_size(raw: impl IntoIterator<Item = f32>, size: usize) -> Vec<f32> {
    let mut features: Vec<f32> = raw.into_iter().take(size).collect();
    features.resize(size, 0.0);
    features
}

/// Encode one state vector as a `[1, dim]` tensor.
pub fn encode_state<B: Backend>(state: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::<B, 1>::from_data(TensorData::from(state), device).reshape([1, state.len() as i32])
}
