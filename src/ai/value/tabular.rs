use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ValueFunction, ValueRow, ValueSnapshot};
use crate::ai::transition::{Transition, UpdateMetrics};
use crate::sim::AgentId;

const TABLE_FILE: &str = "q_table.json";

/// Tabular Q-learning hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TabularConfig {
    pub alpha: f32,
    pub gamma: f32,
    /// Upper clamp of the discretized state.
    pub state_cap: u32,
}

impl Default for TabularConfig {
    fn default() -> Self {
        TabularConfig {
            alpha: 0.1,
            gamma: 0.9,
            state_cap: 10,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TableFile {
    num_actions: usize,
    updates: usize,
    table: BTreeMap<AgentId, BTreeMap<u32, Vec<f32>>>,
}

/// Q-table keyed first by agent, then by discretized state.
///
/// Entries are created on first access with an all-zero action vector.
pub struct TabularQ {
    config: TabularConfig,
    num_actions: usize,
    table: BTreeMap<AgentId, BTreeMap<u32, Vec<f32>>>,
    updates: usize,
}

impl TabularQ {
    pub fn new(config: TabularConfig, num_actions: usize) -> Self {
        TabularQ {
            config,
            num_actions,
            table: BTreeMap::new(),
            updates: 0,
        }
    }

    /// Values for a key that has already been materialized.
    pub fn values(&self, agent: &AgentId, state: u32) -> Option<&[f32]> {
        self.table
            .get(agent)
            .and_then(|states| states.get(&state))
            .map(Vec::as_slice)
    }

    /// Values for `(agent, state)`, inserting a zero vector if absent.
    pub fn entry(&mut self, agent: &AgentId, state: u32) -> &mut Vec<f32> {
        let num_actions = self.num_actions;
        self.table
            .entry(agent.clone())
            .or_default()
            .entry(state)
            .or_insert_with(|| vec![0.0; num_actions])
    }

    /// One-step Q-learning update. Returns the TD error before the update.
    pub fn q_update(
        &mut self,
        agent: &AgentId,
        state: u32,
        action: usize,
        reward: f32,
        next_state: u32,
    ) -> f32 {
        let max_next = self
            .entry(agent, next_state)
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        let TabularConfig { alpha, gamma, .. } = self.config;

        let q = &mut self.entry(agent, state)[action];
        let td_error = reward + gamma * max_next - *q;
        *q += alpha * td_error;
        self.updates += 1;
        td_error
    }

    /// Number of materialized `(agent, state)` entries.
    pub fn len(&self) -> usize {
        self.table.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ValueFunction for TabularQ {
    type State = u32;

    fn name(&self) -> &str {
        "TabularQ"
    }

    fn state_dimension(&self) -> usize {
        1
    }

    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn predict(&mut self, agent: &AgentId, state: &u32) -> Vec<f32> {
        self.entry(agent, *state).clone()
    }

    fn update(&mut self, transition: Transition<u32>) -> Option<UpdateMetrics> {
        let td_error = self.q_update(
            &transition.agent,
            transition.state,
            transition.action,
            transition.reward,
            transition.next_state,
        );
        debug!(
            agent = %transition.agent,
            state = transition.state,
            action = transition.action,
            reward = transition.reward,
            td_error,
            "q-table update"
        );
        Some(UpdateMetrics {
            loss: td_error * td_error,
            samples: 1,
        })
    }

    fn train(&mut self) -> Option<UpdateMetrics> {
        None
    }

    fn update_count(&self) -> usize {
        self.updates
    }

    fn set_update_count(&mut self, updates: usize) {
        self.updates = updates;
    }

    fn snapshot(&self) -> ValueSnapshot {
        let rows = self
            .table
            .iter()
            .flat_map(|(agent, states)| {
                states.iter().map(move |(state, values)| ValueRow {
                    agent: agent.clone(),
                    state: state.to_string(),
                    values: values.clone(),
                })
            })
            .collect();
        ValueSnapshot {
            kind: self.name().to_string(),
            rows,
            updates: self.updates,
        }
    }

    fn save_to_dir(&self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let file = TableFile {
            num_actions: self.num_actions,
            updates: self.updates,
            table: self.table.clone(),
        };
        fs::write(dir.join(TABLE_FILE), serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    fn load_from_dir(&mut self, dir: &Path) -> Result<(), Box<dyn Error>> {
        let json = fs::read_to_string(dir.join(TABLE_FILE))?;
        let file: TableFile = serde_json::from_str(&json)?;
        if file.num_actions != self.num_actions {
            return Err(format!(
                "saved table has {} actions, expected {}",
                file.num_actions, self.num_actions
            )
            .into());
        }
        self.table = file.table;
        self.updates = file.updates;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TabularQ {
        TabularQ::new(TabularConfig::default(), 2)
    }

    #[test]
    fn test_unseen_key_is_zero_vector() {
        let mut q = table();
        let agent = AgentId::from("A");
        assert!(q.values(&agent, 4).is_none());
        assert_eq!(q.predict(&agent, &4), vec![0.0, 0.0]);
        assert_eq!(q.values(&agent, 4), Some(&[0.0, 0.0][..]));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_update_materializes_next_state() {
        let mut q = table();
        let agent = AgentId::from("A");
        q.q_update(&agent, 3, 1, -3.0, 5);
        assert!(q.values(&agent, 5).is_some());
        assert!((q.values(&agent, 3).unwrap()[1] + 0.3).abs() < 1e-6);
        assert_eq!(q.values(&agent, 3).unwrap()[0], 0.0);
    }

    #[test]
    fn test_update_uses_max_of_next_state() {
        let mut q = table();
        let agent = AgentId::from("A");
        q.entry(&agent, 1)[0] = 2.0;
        q.entry(&agent, 1)[1] = 5.0;
        // target = 1 + 0.9 * 5 = 5.5; Q = 0 + 0.1 * 5.5
        let td = q.q_update(&agent, 0, 0, 1.0, 1);
        assert!((td - 5.5).abs() < 1e-5);
        assert!((q.values(&agent, 0).unwrap()[0] - 0.55).abs() < 1e-5);
    }

    #[test]
    fn test_agents_have_separate_rows() {
        let mut q = table();
        let a = AgentId::from("A");
        let b = AgentId::from("B");
        q.q_update(&a, 2, 0, -2.0, 2);
        assert_eq!(q.predict(&b, &2), vec![0.0, 0.0]);
        assert!(q.predict(&a, &2)[0] < 0.0);
    }

    #[test]
    fn test_snapshot_lists_rows_per_agent() {
        let mut q = table();
        let a = AgentId::from("A");
        q.q_update(&a, 2, 1, -1.0, 3);
        let snap = q.snapshot();
        assert_eq!(snap.kind, "TabularQ");
        assert_eq!(snap.updates, 1);
        let states: Vec<&str> = snap.rows_for(&a).map(|r| r.state.as_str()).collect();
        assert_eq!(states, vec!["2", "3"]);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = table();
        let a = AgentId::from("A");
        q.q_update(&a, 1, 1, -4.0, 0);
        q.save_to_dir(dir.path()).unwrap();

        let mut restored = table();
        restored.load_from_dir(dir.path()).unwrap();
        assert_eq!(restored.values(&a, 1), q.values(&a, 1));
        assert_eq!(restored.update_count(), 1);
    }

    #[test]
    fn test_load_rejects_action_count_change() {
        let dir = tempfile::tempdir().unwrap();
        table().save_to_dir(dir.path()).unwrap();
        let mut wider = TabularQ::new(TabularConfig::default(), 4);
        assert!(wider.load_from_dir(dir.path()).is_err());
    }
}
