use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

use super::{AgentId, LaneId, PhaseString, Simulator};
use crate::error::SimulatorError;

/// Speed of a vehicle discharging through a green head, m/s.
const DISCHARGE_SPEED: f32 = 8.0;

/// Parameters of the synthetic queueing network.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub agents: usize,
    pub lanes_per_agent: usize,
    /// Mean arrivals per lane per tick.
    pub arrival_rate: f64,
    /// Vehicles leaving a green lane per tick.
    pub discharge_per_tick: u32,
    /// Ticks during which new vehicles arrive.
    pub arrival_steps: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            agents: 2,
            lanes_per_agent: 4,
            arrival_rate: 0.3,
            discharge_per_tick: 1,
            arrival_steps: 3600,
            seed: None,
        }
    }
}

struct Intersection {
    id: AgentId,
    lanes: Vec<LaneId>,
    phase: PhaseString,
    phase_duration: Option<f64>,
}

#[derive(Default, Clone, Copy)]
struct LaneQueue {
    queued: u32,
    moving: u32,
}

/// A seeded point-queue model of a handful of signalised intersections.
///
/// Lane `i` of an intersection is served by head `i` of its phase string.
/// Each tick Poisson arrivals join every lane's queue and green lanes
/// discharge a fixed number of vehicles. Queued vehicles are halted.
pub struct SyntheticNetwork {
    intersections: Vec<Intersection>,
    lanes: HashMap<LaneId, LaneQueue>,
    arrivals: Option<Poisson<f64>>,
    discharge_per_tick: u32,
    arrival_steps: usize,
    tick: usize,
    connected: bool,
    disconnect_at: Option<usize>,
    rng: StdRng,
}

impl SyntheticNetwork {
    pub fn new(config: &SyntheticConfig) -> Self {
        let mut intersections = Vec::with_capacity(config.agents);
        let mut lanes = HashMap::new();
        for a in 0..config.agents {
            let id = AgentId::new(format!("tl_{a}"));
            let lane_ids: Vec<LaneId> = (0..config.lanes_per_agent)
                .map(|l| LaneId::new(format!("{id}_in_{l}")))
                .collect();
            for lane in &lane_ids {
                lanes.insert(lane.clone(), LaneQueue::default());
            }
            intersections.push(Intersection {
                id,
                phase: PhaseString::alternating(config.lanes_per_agent),
                lanes: lane_ids,
                phase_duration: None,
            });
        }

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        SyntheticNetwork {
            intersections,
            lanes,
            arrivals: Poisson::new(config.arrival_rate).ok(),
            discharge_per_tick: config.discharge_per_tick,
            arrival_steps: config.arrival_steps,
            tick: 0,
            connected: true,
            disconnect_at: None,
            rng,
        }
    }

    /// Build a static network with preset queue lengths and no arrivals or
    /// discharge. Each entry is `(agent, per-lane halting counts)`.
    pub fn from_queues(queues: &[(&str, &[u32])]) -> Self {
        let mut intersections = Vec::with_capacity(queues.len());
        let mut lanes = HashMap::new();
        for (agent, counts) in queues {
            let id = AgentId::from(*agent);
            let lane_ids: Vec<LaneId> = (0..counts.len())
                .map(|l| LaneId::new(format!("{id}_in_{l}")))
                .collect();
            for (lane, &queued) in lane_ids.iter().zip(counts.iter()) {
                lanes.insert(lane.clone(), LaneQueue { queued, moving: 0 });
            }
            intersections.push(Intersection {
                id,
                phase: PhaseString::alternating(counts.len()),
                lanes: lane_ids,
                phase_duration: None,
            });
        }

        SyntheticNetwork {
            intersections,
            lanes,
            arrivals: None,
            discharge_per_tick: 0,
            arrival_steps: 0,
            tick: 0,
            connected: true,
            disconnect_at: None,
            rng: StdRng::seed_from_u64(0),
        }
    }

    #[cfg(test)]
    pub fn with_discharge(mut self, per_tick: u32) -> Self {
        self.discharge_per_tick = per_tick;
        self
    }

    /// Drop the connection once `ticks` ticks have been simulated.
    pub fn disconnect_after(mut self, ticks: usize) -> Self {
        self.disconnect_at = Some(ticks);
        self
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    /// Last phase duration set for `agent`, if any.
    pub fn phase_duration(&self, agent: &AgentId) -> Option<f64> {
        self.intersections
            .iter()
            .find(|i| &i.id == agent)
            .and_then(|i| i.phase_duration)
    }

    pub fn total_queued(&self) -> u32 {
        self.lanes.values().map(|q| q.queued).sum()
    }

    fn ensure_connected(&self) -> Result<(), SimulatorError> {
        if self.connected {
            Ok(())
        } else {
            Err(SimulatorError::Disconnected)
        }
    }

    fn intersection(&self, agent: &AgentId) -> Result<&Intersection, SimulatorError> {
        self.intersections
            .iter()
            .find(|i| &i.id == agent)
            .ok_or_else(|| SimulatorError::UnknownAgent(agent.to_string()))
    }

    fn intersection_mut(&mut self, agent: &AgentId) -> Result<&mut Intersection, SimulatorError> {
        self.intersections
            .iter_mut()
            .find(|i| &i.id == agent)
            .ok_or_else(|| SimulatorError::UnknownAgent(agent.to_string()))
    }

    fn lane(&self, lane: &LaneId) -> Result<LaneQueue, SimulatorError> {
        self.lanes
            .get(lane)
            .copied()
            .ok_or_else(|| SimulatorError::UnknownLane(lane.to_string()))
    }
}

impl Simulator for SyntheticNetwork {
    fn advance(&mut self) -> Result<(), SimulatorError> {
        self.ensure_connected()?;

        let arriving = self.tick < self.arrival_steps;
        for intersection in &self.intersections {
            for (head, lane) in intersection.lanes.iter().enumerate() {
                let Some(queue) = self.lanes.get_mut(lane) else {
                    continue;
                };
                if arriving {
                    if let Some(poisson) = &self.arrivals {
                        queue.queued += poisson.sample(&mut self.rng) as u32;
                    }
                }
                queue.moving = if intersection.phase.is_green(head) {
                    let leaving = queue.queued.min(self.discharge_per_tick);
                    queue.queued -= leaving;
                    leaving
                } else {
                    0
                };
            }
        }

        self.tick += 1;
        if self.disconnect_at.is_some_and(|at| self.tick >= at) {
            self.connected = false;
        }
        Ok(())
    }

    fn controlled_agents(&mut self) -> Result<Vec<AgentId>, SimulatorError> {
        self.ensure_connected()?;
        Ok(self.intersections.iter().map(|i| i.id.clone()).collect())
    }

    fn controlled_lanes(&mut self, agent: &AgentId) -> Result<Vec<LaneId>, SimulatorError> {
        self.ensure_connected()?;
        Ok(self.intersection(agent)?.lanes.clone())
    }

    fn halting_count(&mut self, lane: &LaneId) -> Result<u32, SimulatorError> {
        self.ensure_connected()?;
        Ok(self.lane(lane)?.queued)
    }

    fn vehicle_count(&mut self, lane: &LaneId) -> Result<u32, SimulatorError> {
        self.ensure_connected()?;
        let queue = self.lane(lane)?;
        Ok(queue.queued + queue.moving)
    }

    fn vehicles_below_speed(
        &mut self,
        lane: &LaneId,
        threshold: f32,
    ) -> Result<u32, SimulatorError> {
        self.ensure_connected()?;
        let queue = self.lane(lane)?;
        let slow_moving = if threshold > DISCHARGE_SPEED {
            queue.moving
        } else {
            0
        };
        Ok(queue.queued + slow_moving)
    }

    fn phase_string(&mut self, agent: &AgentId) -> Result<PhaseString, SimulatorError> {
        self.ensure_connected()?;
        Ok(self.intersection(agent)?.phase.clone())
    }

    fn set_phase_string(
        &mut self,
        agent: &AgentId,
        phase: &PhaseString,
    ) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        let intersection = self.intersection_mut(agent)?;
        if phase.len() != intersection.lanes.len() {
            return Err(SimulatorError::InvalidPhase(phase.to_string()));
        }
        intersection.phase = phase.clone();
        Ok(())
    }

    fn set_phase_duration(
        &mut self,
        agent: &AgentId,
        seconds: f64,
    ) -> Result<(), SimulatorError> {
        self.ensure_connected()?;
        self.intersection_mut(agent)?.phase_duration = Some(seconds);
        Ok(())
    }

    fn pending_vehicles(&mut self) -> Result<u32, SimulatorError> {
        self.ensure_connected()?;
        let in_network: u32 = self.lanes.values().map(|q| q.queued + q.moving).sum();
        let still_arriving = u32::from(self.arrivals.is_some() && self.tick < self.arrival_steps);
        Ok(in_network + still_arriving)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_queues_reports_halting_counts() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[1, 2]), ("B", &[0, 0])]);
        let agents = sim.controlled_agents().unwrap();
        assert_eq!(agents, vec![AgentId::from("A"), AgentId::from("B")]);

        let lanes = sim.controlled_lanes(&agents[0]).unwrap();
        let total: u32 = lanes.iter().map(|l| sim.halting_count(l).unwrap()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_green_lanes_discharge() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[5, 5])]).with_discharge(2);
        // Initial phase "gr": lane 0 green, lane 1 red.
        sim.advance().unwrap();
        let lanes = sim.controlled_lanes(&AgentId::from("A")).unwrap();
        assert_eq!(sim.halting_count(&lanes[0]).unwrap(), 3);
        assert_eq!(sim.halting_count(&lanes[1]).unwrap(), 5);
        assert_eq!(sim.vehicle_count(&lanes[0]).unwrap(), 5);
    }

    #[test]
    fn test_toggled_phase_changes_discharge() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[5, 5])]).with_discharge(1);
        let agent = AgentId::from("A");
        let phase = sim.phase_string(&agent).unwrap();
        sim.set_phase_string(&agent, &phase.toggle()).unwrap();
        sim.advance().unwrap();
        let lanes = sim.controlled_lanes(&agent).unwrap();
        assert_eq!(sim.halting_count(&lanes[0]).unwrap(), 5);
        assert_eq!(sim.halting_count(&lanes[1]).unwrap(), 4);
    }

    #[test]
    fn test_set_phase_string_rejects_wrong_length() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[0, 0])]);
        let phase = PhaseString::parse("grg").unwrap();
        assert!(sim.set_phase_string(&AgentId::from("A"), &phase).is_err());
    }

    #[test]
    fn test_disconnect_after_fails_every_call() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[0])]).disconnect_after(1);
        sim.advance().unwrap();
        assert_eq!(sim.advance(), Err(SimulatorError::Disconnected));
        assert_eq!(sim.controlled_agents(), Err(SimulatorError::Disconnected));
    }

    #[test]
    fn test_seeded_networks_are_deterministic() {
        let config = SyntheticConfig {
            seed: Some(7),
            ..Default::default()
        };
        let mut a = SyntheticNetwork::new(&config);
        let mut b = SyntheticNetwork::new(&config);
        for _ in 0..50 {
            a.advance().unwrap();
            b.advance().unwrap();
        }
        assert_eq!(a.total_queued(), b.total_queued());
    }

    #[test]
    fn test_pending_vehicles_drains() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[2])]).with_discharge(1);
        assert_eq!(sim.pending_vehicles().unwrap(), 2);
        sim.advance().unwrap();
        sim.advance().unwrap();
        sim.advance().unwrap();
        assert_eq!(sim.pending_vehicles().unwrap(), 0);
    }

    #[test]
    fn test_unknown_agent() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[0])]);
        assert_eq!(
            sim.phase_string(&AgentId::from("Z")),
            Err(SimulatorError::UnknownAgent("Z".into()))
        );
    }
}
