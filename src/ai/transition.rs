use crate::sim::AgentId;

/// One control step of experience for a single agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition<S> {
    pub agent: AgentId,
    pub state: S,
    pub action: usize,
    pub reward: f32,
    pub next_state: S,
    pub done: bool,
}

/// Metrics returned from a value-function update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateMetrics {
    /// Mean squared error of the update(s) against their targets.
    pub loss: f32,
    /// Number of transitions the update consumed.
    pub samples: usize,
}
