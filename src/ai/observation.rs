use serde::{Deserialize, Serialize};

use crate::error::SimulatorError;
use crate::sim::{AgentId, LaneId, Simulator};

/// Per-lane count used as both state feature and negated reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionMetric {
    /// Vehicles the simulator reports as halting.
    Halting,
    /// Vehicles slower than `threshold` m/s.
    BelowSpeed { threshold: f32 },
}

impl Default for CongestionMetric {
    fn default() -> Self {
        CongestionMetric::Halting
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneObservation {
    pub lane: LaneId,
    pub congestion: u32,
    pub vehicles: u32,
}

/// One snapshot of an agent's controlled lanes.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentObservation {
    pub agent: AgentId,
    pub lanes: Vec<LaneObservation>,
}

impl AgentObservation {
    pub fn total_congestion(&self) -> u32 {
        self.lanes.iter().map(|l| l.congestion).sum()
    }

    pub fn total_vehicles(&self) -> u32 {
        self.lanes.iter().map(|l| l.vehicles).sum()
    }
}

/// Reads lane metrics for an agent from the simulator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Observer {
    metric: CongestionMetric,
}

impl Observer {
    pub fn new(metric: CongestionMetric) -> Self {
        Observer { metric }
    }

    pub fn observe<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        agent: &AgentId,
        lanes: &[LaneId],
    ) -> Result<AgentObservation, SimulatorError> {
        let mut observed = Vec::with_capacity(lanes.len());
        for lane in lanes {
            let congestion = match self.metric {
                CongestionMetric::Halting => simulator.halting_count(lane)?,
                CongestionMetric::BelowSpeed { threshold } => {
                    simulator.vehicles_below_speed(lane, threshold)?
                }
            };
            let vehicles = simulator.vehicle_count(lane)?;
            observed.push(LaneObservation {
                lane: lane.clone(),
                congestion,
                vehicles,
            });
        }
        Ok(AgentObservation {
            agent: agent.clone(),
            lanes: observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SyntheticNetwork;

    #[test]
    fn test_observe_sums_lanes() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[2, 1, 4])]);
        let agent = AgentId::from("A");
        let lanes = sim.controlled_lanes(&agent).unwrap();

        let obs = Observer::default().observe(&mut sim, &agent, &lanes).unwrap();
        assert_eq!(obs.lanes.len(), 3);
        assert_eq!(obs.total_congestion(), 7);
        assert_eq!(obs.total_vehicles(), 7);
    }

    #[test]
    fn test_observe_propagates_disconnect() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[1])]);
        let agent = AgentId::from("A");
        let lanes = sim.controlled_lanes(&agent).unwrap();
        sim.disconnect();

        let err = Observer::new(CongestionMetric::BelowSpeed { threshold: 2.0 })
            .observe(&mut sim, &agent, &lanes)
            .unwrap_err();
        assert_eq!(err, SimulatorError::Disconnected);
    }
}
