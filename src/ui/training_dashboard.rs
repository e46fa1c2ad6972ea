use std::collections::VecDeque;

use crate::ai::value::{ValueRow, ValueSnapshot};
use crate::sim::AgentId;
use crate::training::control_loop::{AgentStep, StepReport};
use crate::training::dashboard_msg::{MetricsSnapshot, TrainingUpdate};

const MAX_HISTORY: usize = 100;
/// Value rows shown for the selected agent.
pub const VALUE_ROWS_SHOWN: usize = 5;

/// Status of the training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStatus {
    Running,
    Paused,
    Finished,
}

/// Dashboard state built only from messages sent by the control thread.
pub struct DashboardState {
    // History buffers: (step, value)
    pub congestion_history: VecDeque<(f64, f64)>,
    pub reward_history: VecDeque<(f64, f64)>,
    pub loss_history: VecDeque<(f64, f64)>,

    // Current values
    pub step: usize,
    pub max_steps: usize,
    pub episode: usize,
    pub epsilon: f32,
    pub average_reward: f32,
    pub average_congestion: f32,
    pub loss: f32,
    pub updates: usize,
    pub steps_per_sec: f32,
    pub value_function: String,

    pub action_labels: Vec<String>,
    pub action_counts: Vec<u64>,
    /// Latest step of each agent, in control order.
    pub agents: Vec<AgentStep>,
    pub values: ValueSnapshot,
    pub selected_agent: usize,
    pub steps_per_tick: usize,

    // Status
    pub status: TrainingStatus,
    pub last_checkpoint: Option<String>,
    pub last_error: Option<String>,
}

impl DashboardState {
    pub fn new(max_steps: usize, value_function: &str, action_labels: Vec<String>) -> Self {
        let action_counts = vec![0; action_labels.len()];
        DashboardState {
            congestion_history: VecDeque::new(),
            reward_history: VecDeque::new(),
            loss_history: VecDeque::new(),

            step: 0,
            max_steps,
            episode: 0,
            epsilon: 0.0,
            average_reward: 0.0,
            average_congestion: 0.0,
            loss: 0.0,
            updates: 0,
            steps_per_sec: 0.0,
            value_function: value_function.to_string(),

            action_labels,
            action_counts,
            agents: Vec::new(),
            values: ValueSnapshot::default(),
            selected_agent: 0,
            steps_per_tick: 1,

            status: TrainingStatus::Running,
            last_checkpoint: None,
            last_error: None,
        }
    }

    /// Fold one message from the control thread into the dashboard.
    pub fn apply(&mut self, update: TrainingUpdate) {
        match update {
            TrainingUpdate::Step(report) => self.apply_step(&report),
            TrainingUpdate::Metrics(snap) => self.apply_metrics(&snap),
            TrainingUpdate::Values(values) => self.values = values,
            TrainingUpdate::CheckpointSaved { step, path } => {
                self.last_checkpoint = Some(format!("step {} ({})", step, path.display()));
            }
            TrainingUpdate::Error(message) => self.last_error = Some(message),
            TrainingUpdate::Finished => self.status = TrainingStatus::Finished,
        }
    }

    pub fn apply_step(&mut self, report: &StepReport) {
        self.step = report.step;
        self.episode = report.episode;
        self.epsilon = report.epsilon;

        let x = report.step as f64;
        push_capped(
            &mut self.congestion_history,
            (x, report.total_congestion() as f64),
        );
        push_capped(&mut self.reward_history, (x, report.total_reward() as f64));
        if let Some(update) = &report.update {
            push_capped(&mut self.loss_history, (x, update.loss as f64));
        }

        for agent in &report.agents {
            if let Some(count) = self.action_counts.get_mut(agent.action) {
                *count += 1;
            }
        }
        self.agents = report.agents.clone();
        if self.selected_agent >= self.agents.len() {
            self.selected_agent = 0;
        }
    }

    /// Apply a metrics snapshot. Its action counts replace the locally
    /// accumulated ones, which miss steps skipped by the update interval.
    pub fn apply_metrics(&mut self, snap: &MetricsSnapshot) {
        self.step = snap.step;
        self.max_steps = snap.max_steps;
        self.episode = snap.episode;
        self.epsilon = snap.epsilon;
        self.average_reward = snap.average_reward;
        self.average_congestion = snap.average_congestion;
        self.loss = snap.loss;
        self.updates = snap.updates;
        self.steps_per_sec = snap.steps_per_sec;
        self.value_function = snap.value_function.clone();
        if snap.action_counts.len() == self.action_counts.len() {
            self.action_counts = snap.action_counts.clone();
        }
    }

    pub fn select_next_agent(&mut self) {
        if !self.agents.is_empty() {
            self.selected_agent = (self.selected_agent + 1) % self.agents.len();
        }
    }

    pub fn selected_agent_id(&self) -> Option<&AgentId> {
        self.agents.get(self.selected_agent).map(|a| &a.agent)
    }

    /// First few value rows of the selected agent.
    pub fn selected_value_rows(&self) -> Vec<&ValueRow> {
        match self.selected_agent_id() {
            Some(agent) => self
                .values
                .rows_for(agent)
                .take(VALUE_ROWS_SHOWN)
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn faster(&mut self) -> usize {
        self.steps_per_tick = (self.steps_per_tick * 2).min(1024);
        self.steps_per_tick
    }

    pub fn slower(&mut self) -> usize {
        self.steps_per_tick = (self.steps_per_tick / 2).max(1);
        self.steps_per_tick
    }

    /// Progress ratio [0.0, 1.0].
    pub fn progress(&self) -> f64 {
        if self.max_steps == 0 {
            return 0.0;
        }
        self.step as f64 / self.max_steps as f64
    }
}

fn push_capped(history: &mut VecDeque<(f64, f64)>, point: (f64, f64)) {
    history.push_back(point);
    if history.len() > MAX_HISTORY {
        history.pop_front();
    }
}
