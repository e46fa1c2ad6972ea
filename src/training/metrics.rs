use std::collections::VecDeque;

use crate::training::control_loop::StepReport;

/// Rolling training metrics over the most recent control steps.
pub struct TrainingMetrics {
    step_rewards: VecDeque<f32>,
    step_congestion: VecDeque<u32>,
    update_losses: VecDeque<f32>,
    action_counts: Vec<u64>,
    capacity: usize,
    total_steps: usize, // lifetime count, never capped
    total_updates: usize,
}

impl TrainingMetrics {
    pub fn with_capacity(capacity: usize, num_actions: usize) -> Self {
        TrainingMetrics {
            step_rewards: VecDeque::with_capacity(capacity),
            step_congestion: VecDeque::with_capacity(capacity),
            update_losses: VecDeque::with_capacity(capacity),
            action_counts: vec![0; num_actions],
            capacity,
            total_steps: 0,
            total_updates: 0,
        }
    }

    #[cfg(test)]
    pub fn new(num_actions: usize) -> Self {
        Self::with_capacity(100, num_actions)
    }

    /// Record every agent's reward, congestion and action from one step.
    pub fn record_step(&mut self, report: &StepReport) {
        self.total_steps += 1;
        push_capped(&mut self.step_rewards, report.total_reward(), self.capacity);
        push_capped(
            &mut self.step_congestion,
            report.total_congestion(),
            self.capacity,
        );
        for agent in &report.agents {
            if let Some(count) = self.action_counts.get_mut(agent.action) {
                *count += 1;
            }
        }
        if let Some(update) = &report.update {
            self.record_update(update.loss);
        }
    }

    pub fn record_update(&mut self, loss: f32) {
        self.total_updates += 1;
        push_capped(&mut self.update_losses, loss, self.capacity);
    }

    /// Mean summed reward per step over the last N steps.
    pub fn average_reward(&self, last_n: usize) -> f32 {
        mean_of_last(self.step_rewards.iter().copied(), self.step_rewards.len(), last_n)
    }

    /// Mean summed congestion per step over the last N steps.
    pub fn average_congestion(&self, last_n: usize) -> f32 {
        mean_of_last(
            self.step_congestion.iter().map(|&c| c as f32),
            self.step_congestion.len(),
            last_n,
        )
    }

    /// Average loss over the last N updates.
    pub fn average_loss(&self, last_n: usize) -> f32 {
        mean_of_last(self.update_losses.iter().copied(), self.update_losses.len(), last_n)
    }

    pub fn action_counts(&self) -> &[u64] {
        &self.action_counts
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn total_updates(&self) -> usize {
        self.total_updates
    }
}

fn push_capped<T>(queue: &mut VecDeque<T>, value: T, capacity: usize) {
    queue.push_back(value);
    if queue.len() > capacity {
        queue.pop_front();
    }
}

fn mean_of_last(values: impl DoubleEndedIterator<Item = f32>, len: usize, last_n: usize) -> f32 {
    let n = len.min(last_n);
    if n == 0 {
        return 0.0;
    }
    let sum: f32 = values.rev().take(n).sum();
    sum / n as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::transition::UpdateMetrics;
    use crate::sim::AgentId;
    use crate::training::control_loop::AgentStep;

    fn report(rewards: &[(f32, usize)], loss: Option<f32>) -> StepReport {
        StepReport {
            step: 1,
            episode: 0,
            epsilon: 0.1,
            agents: rewards
                .iter()
                .enumerate()
                .map(|(i, &(reward, action))| AgentStep {
                    agent: AgentId::new(format!("a{i}")),
                    state: "0".into(),
                    action,
                    action_label: String::new(),
                    reward,
                    congestion: (-reward) as u32,
                    values: vec![0.0, 0.0],
                })
                .collect(),
            update: loss.map(|loss| UpdateMetrics { loss, samples: 1 }),
            episode_finished: false,
            finished: false,
        }
    }

    #[test]
    fn test_average_reward_and_congestion() {
        let mut m = TrainingMetrics::new(2);
        m.record_step(&report(&[(-3.0, 0), (-1.0, 1)], None));
        m.record_step(&report(&[(0.0, 1), (-2.0, 1)], None));
        assert!((m.average_reward(10) + 3.0).abs() < 1e-6);
        assert!((m.average_congestion(10) - 3.0).abs() < 1e-6);
        assert_eq!(m.action_counts(), &[1, 3]);
        assert_eq!(m.total_steps(), 2);
    }

    #[test]
    fn test_average_loss_only_counts_updates() {
        let mut m = TrainingMetrics::new(2);
        m.record_step(&report(&[(0.0, 0)], Some(1.0)));
        m.record_step(&report(&[(0.0, 0)], None));
        m.record_step(&report(&[(0.0, 0)], Some(3.0)));
        assert!((m.average_loss(10) - 2.0).abs() < 1e-6);
        assert_eq!(m.total_updates(), 2);
    }

    #[test]
    fn test_window_is_capped() {
        let mut m = TrainingMetrics::with_capacity(3, 2);
        for r in [-10.0, -1.0, -1.0, -1.0] {
            m.record_step(&report(&[(r, 0)], None));
        }
        assert!((m.average_reward(100) + 1.0).abs() < 1e-6);
        assert_eq!(m.total_steps(), 4);
    }

    #[test]
    fn test_last_n() {
        let mut m = TrainingMetrics::new(2);
        m.record_update(9.0);
        m.record_update(5.0);
        assert!((m.average_loss(1) - 5.0).abs() < 1e-6);
        assert_eq!(TrainingMetrics::new(2).average_loss(10), 0.0);
    }
}
