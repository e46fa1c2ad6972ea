//! Simulator collaborator: identifiers, phase strings, the [`Simulator`]
//! trait the control loop drives, and a small synthetic network for running
//! the controller without an external simulator process.

mod phase;
mod synthetic;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SimulatorError;

pub use phase::PhaseString;
pub use synthetic::{SyntheticConfig, SyntheticNetwork};

/// Identifier of a controlled signal (one per intersection).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        AgentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        AgentId::new(id)
    }
}

/// Identifier of a lane controlled by a signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LaneId(String);

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        LaneId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LaneId {
    fn from(id: &str) -> Self {
        LaneId::new(id)
    }
}

/// Imperative step/query interface of a microscopic traffic simulator.
///
/// Every call may fail with a [`SimulatorError`]; callers treat any failure
/// as fatal and never retry.
pub trait Simulator {
    /// Advance the simulation by one tick.
    fn advance(&mut self) -> Result<(), SimulatorError>;

    /// All signals the simulator exposes for control.
    fn controlled_agents(&mut self) -> Result<Vec<AgentId>, SimulatorError>;

    /// Lanes controlled by `agent`, in signal-head order.
    fn controlled_lanes(&mut self, agent: &AgentId) -> Result<Vec<LaneId>, SimulatorError>;

    /// Vehicles halted on `lane` during the last tick.
    fn halting_count(&mut self, lane: &LaneId) -> Result<u32, SimulatorError>;

    /// Vehicles present on `lane` during the last tick.
    fn vehicle_count(&mut self, lane: &LaneId) -> Result<u32, SimulatorError>;

    /// Vehicles on `lane` slower than `threshold` m/s during the last tick.
    fn vehicles_below_speed(&mut self, lane: &LaneId, threshold: f32)
        -> Result<u32, SimulatorError>;

    fn phase_string(&mut self, agent: &AgentId) -> Result<PhaseString, SimulatorError>;

    fn set_phase_string(
        &mut self,
        agent: &AgentId,
        phase: &PhaseString,
    ) -> Result<(), SimulatorError>;

    /// Set the remaining duration of the agent's current phase, in seconds.
    fn set_phase_duration(&mut self, agent: &AgentId, seconds: f64)
        -> Result<(), SimulatorError>;

    /// Vehicles still in, or expected to enter, the network.
    fn pending_vehicles(&mut self) -> Result<u32, SimulatorError>;
}
