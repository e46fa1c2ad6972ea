use serde::{Deserialize, Serialize};

/// Metrics snapshot at checkpoint time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    pub average_reward: f32,
    pub average_congestion: f32,
    pub current_loss: f32,
    pub updates: usize,
}

/// Top-level checkpoint metadata written to metadata.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub step: usize,
    pub episode: usize,
    pub timestamp: u64,
    /// Name of the value function that wrote the blob ("TabularQ", ...).
    pub value_function: String,
    pub epsilon: f32,
    pub metrics: CheckpointMetrics,
}
