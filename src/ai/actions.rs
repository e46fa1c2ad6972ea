use serde::{Deserialize, Serialize};

use crate::error::SimulatorError;
use crate::sim::{AgentId, Simulator};

/// What an action index does to a signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignalAction {
    Maintain,
    Toggle,
    SetDuration(u32),
}

/// The fixed action set shared by every agent of one value function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSet {
    /// `0` keeps the current phase, `1` swaps red and green heads.
    PhaseToggle,
    /// Action `i` sets the current phase duration to `durations[i]` seconds.
    GreenDurations(Vec<u32>),
}

impl Default for ActionSet {
    fn default() -> Self {
        ActionSet::PhaseToggle
    }
}

impl ActionSet {
    pub fn len(&self) -> usize {
        match self {
            ActionSet::PhaseToggle => 2,
            ActionSet::GreenDurations(durations) => durations.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn signal_action(&self, index: usize) -> Option<SignalAction> {
        match self {
            ActionSet::PhaseToggle => match index {
                0 => Some(SignalAction::Maintain),
                1 => Some(SignalAction::Toggle),
                _ => None,
            },
            ActionSet::GreenDurations(durations) => {
                durations.get(index).map(|&d| SignalAction::SetDuration(d))
            }
        }
    }

    pub fn label(&self, index: usize) -> String {
        match self.signal_action(index) {
            Some(SignalAction::Maintain) => "maintain".to_string(),
            Some(SignalAction::Toggle) => "toggle".to_string(),
            Some(SignalAction::SetDuration(d)) => format!("{d}s"),
            None => format!("#{index}"),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        (0..self.len()).map(|i| self.label(i)).collect()
    }

    /// Apply action `index` to `agent`. Indices outside the set leave the
    /// signal untouched.
    pub fn apply<S: Simulator + ?Sized>(
        &self,
        simulator: &mut S,
        agent: &AgentId,
        index: usize,
    ) -> Result<(), SimulatorError> {
        match self.signal_action(index) {
            Some(SignalAction::Toggle) => {
                let phase = simulator.phase_string(agent)?;
                simulator.set_phase_string(agent, &phase.toggle())
            }
            Some(SignalAction::SetDuration(seconds)) => {
                simulator.set_phase_duration(agent, f64::from(seconds))
            }
            Some(SignalAction::Maintain) | None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SyntheticNetwork;

    #[test]
    fn test_phase_toggle_actions() {
        let actions = ActionSet::PhaseToggle;
        assert_eq!(actions.len(), 2);
        assert_eq!(actions.labels(), vec!["maintain", "toggle"]);
        assert_eq!(actions.signal_action(2), None);
    }

    #[test]
    fn test_apply_toggle_and_maintain() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[0, 0])]);
        let agent = AgentId::from("A");
        let actions = ActionSet::PhaseToggle;

        actions.apply(&mut sim, &agent, 0).unwrap();
        assert_eq!(sim.phase_string(&agent).unwrap().as_str(), "gr");

        actions.apply(&mut sim, &agent, 1).unwrap();
        assert_eq!(sim.phase_string(&agent).unwrap().as_str(), "rg");
    }

    #[test]
    fn test_apply_green_duration() {
        let mut sim = SyntheticNetwork::from_queues(&[("A", &[0, 0])]);
        let agent = AgentId::from("A");
        let actions = ActionSet::GreenDurations(vec![5, 10, 15, 20]);
        assert_eq!(actions.label(2), "15s");

        actions.apply(&mut sim, &agent, 2).unwrap();
        assert_eq!(sim.phase_duration(&agent), Some(15.0));
    }
}
