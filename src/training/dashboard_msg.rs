use std::path::PathBuf;

use crate::ai::value::ValueSnapshot;
use crate::training::control_loop::StepReport;

/// Periodic metrics snapshot sent from the control thread to the dashboard.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub step: usize,
    pub max_steps: usize,
    pub episode: usize,
    pub epsilon: f32,
    pub average_reward: f32,
    pub average_congestion: f32,
    pub loss: f32,
    pub updates: usize,
    pub action_counts: Vec<u64>,
    pub value_function: String,
    pub steps_per_sec: f32,
}

/// Updates sent from the control thread to the UI.
#[derive(Debug, Clone)]
pub enum TrainingUpdate {
    Step(StepReport),
    Metrics(MetricsSnapshot),
    Values(ValueSnapshot),
    CheckpointSaved { step: usize, path: PathBuf },
    Error(String),
    Finished,
}

/// Commands sent from the UI to the control thread.
#[derive(Debug, Clone)]
pub enum TrainingCommand {
    SaveCheckpoint,
    /// Outer steps to run between dashboard refreshes.
    SetStepsPerTick(usize),
}
