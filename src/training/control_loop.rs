use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::ai::actions::ActionSet;
use crate::ai::observation::{AgentObservation, CongestionMetric, Observer};
use crate::ai::policy::EpsilonGreedy;
use crate::ai::reward::congestion_reward;
use crate::ai::state_encoding::StateEncoder;
use crate::ai::transition::{Transition, UpdateMetrics};
use crate::ai::value::ValueFunction;
use crate::error::ControlError;
use crate::sim::{AgentId, LaneId, Simulator};

/// When an episode ends on its own, independent of the step budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Only `episode_steps` and `max_steps` end episodes and the run.
    #[default]
    Never,
    /// The episode ends, and with it the run, once the simulator has no
    /// vehicles left to serve.
    Drained,
}

/// When deferred value-function training (replay) runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplaySchedule {
    /// Once per outer step, after every agent's transition is recorded.
    #[default]
    PerStep,
    /// Once at each episode boundary.
    PerEpisode,
}

/// Queue-priority duration extension applied after every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreenExtension {
    pub base_green: u32,
    pub max_green: u32,
}

impl Default for GreenExtension {
    fn default() -> Self {
        GreenExtension {
            base_green: 10,
            max_green: 30,
        }
    }
}

impl GreenExtension {
    /// `min(base + queue / 2, max)` seconds.
    pub fn duration_for(&self, queue: u32) -> u32 {
        (self.base_green + queue / 2).min(self.max_green)
    }
}

/// Control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Total outer steps before the run finishes.
    pub max_steps: usize,
    /// Outer steps per episode.
    pub episode_steps: usize,
    pub termination: Termination,
    pub replay: ReplaySchedule,
    pub actions: ActionSet,
    pub congestion: CongestionMetric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub green_extension: Option<GreenExtension>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            max_steps: 100_000,
            episode_steps: 1000,
            termination: Termination::Never,
            replay: ReplaySchedule::PerStep,
            actions: ActionSet::PhaseToggle,
            congestion: CongestionMetric::Halting,
            green_extension: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Finished,
}

/// What one agent did during a step.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentStep {
    pub agent: AgentId,
    /// Debug rendering of the encoded state the action was chosen from.
    pub state: String,
    pub action: usize,
    pub action_label: String,
    pub reward: f32,
    /// Total congestion in the snapshot the reward came from.
    pub congestion: u32,
    /// Values the policy chose from.
    pub values: Vec<f32>,
}

/// Result of one outer step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: usize,
    pub episode: usize,
    pub epsilon: f32,
    pub agents: Vec<AgentStep>,
    /// Combined metrics of every value-function update made this step.
    pub update: Option<UpdateMetrics>,
    pub episode_finished: bool,
    pub finished: bool,
}

impl StepReport {
    pub fn total_reward(&self) -> f32 {
        self.agents.iter().map(|a| a.reward).sum()
    }

    pub fn total_congestion(&self) -> u32 {
        self.agents.iter().map(|a| a.congestion).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub episodes: usize,
    pub total_reward: f32,
    /// True when the stop flag ended the run before it finished.
    pub stopped: bool,
}

struct Pending<S> {
    agent: AgentId,
    lanes: Vec<LaneId>,
    state: S,
    action: usize,
    values: Vec<f32>,
}

/// Drives one simulator with one value function for every controlled agent.
///
/// Each outer step runs three passes: every agent observes, selects and
/// applies an action; the simulator advances once; every agent observes
/// the new snapshot, which yields both its next state and its reward, and
/// the transition goes to the value function.
pub struct ControlLoop<S, E, V>
where
    S: Simulator,
    E: StateEncoder,
    V: ValueFunction<State = E::State>,
{
    simulator: S,
    encoder: E,
    values: V,
    policy: EpsilonGreedy,
    observer: Observer,
    config: ControlConfig,
    state: LoopState,
    agents: Vec<(AgentId, Vec<LaneId>)>,
    step: usize,
    episode: usize,
    episode_step: usize,
}

impl<S, E, V> ControlLoop<S, E, V>
where
    S: Simulator,
    E: StateEncoder,
    V: ValueFunction<State = E::State>,
{
    /// Fails if the encoder and value function disagree on the state
    /// dimension, or the action set and value function on the action count.
    pub fn new(
        simulator: S,
        encoder: E,
        values: V,
        policy: EpsilonGreedy,
        config: ControlConfig,
    ) -> Result<Self, ControlError> {
        if encoder.dimension() != values.state_dimension() {
            return Err(ControlError::DimensionMismatch {
                encoder: encoder.dimension(),
                value_function: values.state_dimension(),
            });
        }
        if config.actions.len() != values.num_actions() {
            return Err(ControlError::ActionCountMismatch {
                action_set: config.actions.len(),
                value_function: values.num_actions(),
            });
        }

        Ok(ControlLoop {
            simulator,
            encoder,
            values,
            policy,
            observer: Observer::new(config.congestion),
            config,
            state: LoopState::Idle,
            agents: Vec::new(),
            step: 0,
            episode: 0,
            episode_step: 0,
        })
    }

    /// Discover the controlled agents and their lanes. Idle -> Running.
    pub fn start(&mut self) -> Result<(), ControlError> {
        match self.state {
            LoopState::Running => return Ok(()),
            LoopState::Finished => return Err(ControlError::AlreadyFinished),
            LoopState::Idle => {}
        }

        let mut agents = Vec::new();
        for agent in self.simulator.controlled_agents()? {
            let lanes = self.simulator.controlled_lanes(&agent)?;
            agents.push((agent, lanes));
        }
        if agents.is_empty() {
            return Err(ControlError::NoAgents);
        }

        info!(
            agents = agents.len(),
            value_function = self.values.name(),
            actions = self.config.actions.len(),
            "control loop started"
        );
        self.agents = agents;
        self.state = LoopState::Running;
        Ok(())
    }

    /// Run one outer step. Any simulator failure aborts the loop: the step
    /// is abandoned and the loop moves to `Finished`.
    pub fn step(&mut self) -> Result<StepReport, ControlError> {
        match self.state {
            LoopState::Idle => return Err(ControlError::NotStarted),
            LoopState::Finished => return Err(ControlError::AlreadyFinished),
            LoopState::Running => {}
        }

        match self.run_step() {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(step = self.step, error = %e, "control step aborted");
                self.state = LoopState::Finished;
                Err(e)
            }
        }
    }

    fn run_step(&mut self) -> Result<StepReport, ControlError> {
        let actions = self.config.actions.clone();

        let mut pending = Vec::with_capacity(self.agents.len());
        for (agent, lanes) in &self.agents {
            let observation = self.observer.observe(&mut self.simulator, agent, lanes)?;
            let state = self.encoder.encode(&observation);
            let (action, values) = self.policy.select_action(&mut self.values, agent, &state);
            actions.apply(&mut self.simulator, agent, action)?;
            pending.push(Pending {
                agent: agent.clone(),
                lanes: lanes.clone(),
                state,
                action,
                values,
            });
        }

        self.simulator.advance()?;
        self.step += 1;
        self.episode_step += 1;

        let drained = self.config.termination == Termination::Drained
            && self.simulator.pending_vehicles()? == 0;

        let mut update: Option<UpdateMetrics> = None;
        let mut agent_steps = Vec::with_capacity(pending.len());
        let mut observations = Vec::with_capacity(pending.len());
        for p in pending {
            let observation = self
                .observer
                .observe(&mut self.simulator, &p.agent, &p.lanes)?;
            let next_state = self.encoder.encode(&observation);
            let reward = congestion_reward(&observation);

            agent_steps.push(AgentStep {
                agent: p.agent.clone(),
                state: format!("{:?}", p.state),
                action: p.action,
                action_label: actions.label(p.action),
                reward,
                congestion: observation.total_congestion(),
                values: p.values,
            });

            let transition = Transition {
                agent: p.agent,
                state: p.state,
                action: p.action,
                reward,
                next_state,
                done: drained,
            };
            if let Some(metrics) = self.values.update(transition) {
                merge_metrics(&mut update, metrics);
            }
            observations.push(observation);
        }

        if let Some(extension) = self.config.green_extension.clone() {
            self.extend_longest_queue(&extension, &observations)?;
        }

        if self.config.replay == ReplaySchedule::PerStep {
            if let Some(metrics) = self.values.train() {
                merge_metrics(&mut update, metrics);
            }
        }

        let episode_finished = drained || self.episode_step >= self.config.episode_steps;
        let report_episode = self.episode;
        if episode_finished {
            if let Some(metrics) = self.end_episode() {
                merge_metrics(&mut update, metrics);
            }
        }

        let finished = drained || self.step >= self.config.max_steps;
        if finished {
            info!(
                steps = self.step,
                episodes = self.episode,
                drained,
                "control loop finished"
            );
            self.state = LoopState::Finished;
        }

        Ok(StepReport {
            step: self.step,
            episode: report_episode,
            epsilon: self.policy.epsilon(),
            agents: agent_steps,
            update,
            episode_finished,
            finished,
        })
    }

    fn end_episode(&mut self) -> Option<UpdateMetrics> {
        let trained = if self.config.replay == ReplaySchedule::PerEpisode {
            self.values.train()
        } else {
            None
        };
        if self.policy.decays_per_episode() {
            self.policy.decay();
        }
        debug!(
            episode = self.episode,
            steps = self.episode_step,
            epsilon = self.policy.epsilon(),
            "episode finished"
        );
        self.episode += 1;
        self.episode_step = 0;
        trained
    }

    fn extend_longest_queue(
        &mut self,
        extension: &GreenExtension,
        observations: &[AgentObservation],
    ) -> Result<(), ControlError> {
        let mut longest: Option<&AgentObservation> = None;
        for observation in observations {
            let better = longest
                .map_or(true, |best| observation.total_congestion() > best.total_congestion());
            if better {
                longest = Some(observation);
            }
        }
        if let Some(observation) = longest {
            let queue = observation.total_congestion();
            if queue > 0 {
                let seconds = extension.duration_for(queue);
                self.simulator
                    .set_phase_duration(&observation.agent, f64::from(seconds))?;
                debug!(agent = %observation.agent, queue, seconds, "green extended");
            }
        }
        Ok(())
    }

    /// Start if needed, then step until finished or `stop` is raised.
    /// `stop` is checked once per outer step.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut on_step: F) -> Result<RunSummary, ControlError>
    where
        F: FnMut(&StepReport),
    {
        if self.state == LoopState::Idle {
            self.start()?;
        }

        let mut summary = RunSummary::default();
        while self.state == LoopState::Running {
            if stop.load(Ordering::Relaxed) {
                summary.stopped = true;
                break;
            }
            let report = self.step()?;
            summary.total_reward += report.total_reward();
            on_step(&report);
        }
        summary.steps = self.step;
        summary.episodes = self.episode;
        Ok(summary)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn step_count(&self) -> usize {
        self.step
    }

    pub fn episode(&self) -> usize {
        self.episode
    }

    /// Controlled agents discovered by [`ControlLoop::start`].
    pub fn agents(&self) -> impl Iterator<Item = &AgentId> {
        self.agents.iter().map(|(agent, _)| agent)
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    pub fn values(&self) -> &V {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut V {
        &mut self.values
    }

    pub fn policy(&self) -> &EpsilonGreedy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut EpsilonGreedy {
        &mut self.policy
    }

    /// Restore counters after loading a checkpoint. A loop resumed at or
    /// past its step budget is already `Finished`.
    pub fn resume_from(&mut self, step: usize, episode: usize) {
        self.step = step;
        self.episode = episode;
        self.episode_step = 0;
        if self.step >= self.config.max_steps {
            info!(
                step,
                max_steps = self.config.max_steps,
                "resumed at step budget, nothing left to run"
            );
            self.state = LoopState::Finished;
        }
    }
}

/// Fold `next` into `acc`, weighting losses by sample count.
fn merge_metrics(acc: &mut Option<UpdateMetrics>, next: UpdateMetrics) {
    match acc {
        None => *acc = Some(next),
        Some(current) => {
            let samples = current.samples + next.samples;
            if samples > 0 {
                current.loss = (current.loss * current.samples as f32
                    + next.loss * next.samples as f32)
                    / samples as f32;
            }
            current.samples = samples;
        }
    }
}
