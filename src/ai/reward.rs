use crate::ai::observation::AgentObservation;

/// Negative total congestion over the agent's controlled lanes.
///
/// Takes the same snapshot that produced the transition's next state.
pub fn congestion_reward(observation: &AgentObservation) -> f32 {
    -(observation.total_congestion() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::observation::LaneObservation;
    use crate::sim::{AgentId, LaneId};

    #[test]
    fn test_reward_is_negated_congestion() {
        let obs = AgentObservation {
            agent: AgentId::from("A"),
            lanes: vec![
                LaneObservation {
                    lane: LaneId::from("a0"),
                    congestion: 2,
                    vehicles: 6,
                },
                LaneObservation {
                    lane: LaneId::from("a1"),
                    congestion: 1,
                    vehicles: 1,
                },
            ],
        };
        assert_eq!(congestion_reward(&obs), -3.0);
    }

    #[test]
    fn test_empty_intersection_rewards_zero() {
        let obs = AgentObservation {
            agent: AgentId::from("B"),
            lanes: vec![],
        };
        assert_eq!(congestion_reward(&obs), 0.0);
    }
}
