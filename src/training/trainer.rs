use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::ai::state_encoding::StateEncoder;
use crate::ai::value::ValueFunction;
use crate::checkpoint::{CheckpointManager, CheckpointManagerConfig, CheckpointMetrics};
use crate::error::{CheckpointError, ControlError};
use crate::sim::Simulator;
use crate::training::control_loop::{ControlLoop, LoopState, RunSummary};
use crate::training::dashboard_msg::{MetricsSnapshot, TrainingCommand, TrainingUpdate};
use crate::training::metrics::TrainingMetrics;

/// Trainer configuration.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Steps between headless progress logs. 0 disables.
    pub log_interval: usize,
    /// Steps between `TrainingUpdate::Step` messages.
    pub live_update_interval: usize,
    /// Steps between value snapshots and metrics sent to the dashboard.
    pub snapshot_interval: usize,
    /// Steps between checkpoints. 0 disables.
    pub checkpoint_interval: usize,
    /// Rolling window for averaged metrics.
    pub metrics_window: usize,
    /// Dashboard mode: pause between batches of steps.
    pub tick_delay_ms: u64,
    /// Dashboard mode: steps per batch.
    pub steps_per_tick: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            log_interval: 1000,
            live_update_interval: 1,
            snapshot_interval: 50,
            checkpoint_interval: 10_000,
            metrics_window: 100,
            tick_delay_ms: 50,
            steps_per_tick: 1,
        }
    }
}

/// Runs a [`ControlLoop`] to completion, logging, checkpointing and
/// optionally feeding a dashboard.
pub struct Trainer {
    config: TrainerConfig,
    checkpoint_manager: CheckpointManager,
}

impl Trainer {
    pub fn new(config: TrainerConfig, checkpoint: CheckpointManagerConfig) -> Self {
        Trainer {
            config,
            checkpoint_manager: CheckpointManager::new(checkpoint),
        }
    }

    /// Restore the latest checkpoint into `control`. Returns the restored
    /// step, or `None` when there is no checkpoint yet.
    pub fn resume<S, E, V>(
        &self,
        control: &mut ControlLoop<S, E, V>,
    ) -> Result<Option<usize>, CheckpointError>
    where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        let data = match self.checkpoint_manager.load_latest() {
            Ok(data) => data,
            Err(CheckpointError::NoLatestSymlink(dir)) => {
                info!(dir = %dir.display(), "no checkpoint found, starting fresh");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        self.checkpoint_manager.restore(control.values_mut(), &data)?;
        control.resume_from(data.metadata.step, data.metadata.episode);
        control.policy_mut().set_epsilon(data.metadata.epsilon);
        info!(
            step = data.metadata.step,
            episode = data.metadata.episode,
            path = %data.path.display(),
            "resumed from checkpoint"
        );
        Ok(Some(data.metadata.step))
    }

    /// Run until the loop finishes or `stop` is raised, logging every
    /// `log_interval` steps.
    pub fn run_headless<S, E, V>(
        &self,
        control: &mut ControlLoop<S, E, V>,
        stop: &AtomicBool,
    ) -> Result<RunSummary, ControlError>
    where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        let window = self.config.metrics_window;
        let mut metrics =
            TrainingMetrics::with_capacity(window, control.config().actions.len());
        let mut summary = RunSummary::default();
        let mut window_start = Instant::now();

        if control.state() == LoopState::Idle {
            control.start()?;
        }
        info!(
            max_steps = control.config().max_steps,
            value_function = control.values().name(),
            "starting training run"
        );

        while control.state() == LoopState::Running {
            if stop.load(Ordering::Relaxed) {
                summary.stopped = true;
                break;
            }
            let report = control.step()?;
            summary.total_reward += report.total_reward();
            metrics.record_step(&report);

            if every(report.step, self.config.log_interval) {
                let elapsed = window_start.elapsed().as_secs_f32();
                info!(
                    step = report.step,
                    episode = report.episode,
                    epsilon = report.epsilon,
                    reward = metrics.average_reward(window),
                    congestion = metrics.average_congestion(window),
                    loss = metrics.average_loss(window),
                    steps_per_sec = rate(self.config.log_interval, elapsed).round(),
                    "progress"
                );
                window_start = Instant::now();
            }

            if every(report.step, self.config.checkpoint_interval) {
                if let Err(e) = self.save_checkpoint(control, &metrics) {
                    warn!(error = %e, "checkpoint failed");
                }
            }
        }

        summary.steps = control.step_count();
        summary.episodes = control.episode();
        info!(
            steps = summary.steps,
            episodes = summary.episodes,
            steps_this_run = metrics.total_steps(),
            updates_this_run = metrics.total_updates(),
            total_reward = summary.total_reward,
            "training run complete"
        );
        Ok(summary)
    }

    /// Dashboard variant: runs on the worker thread, publishes snapshots over
    /// `update_tx` and never shares the live value function.
    pub fn run_with_dashboard<S, E, V>(
        &self,
        control: &mut ControlLoop<S, E, V>,
        update_tx: Sender<TrainingUpdate>,
        cmd_rx: Receiver<TrainingCommand>,
        pause: Arc<AtomicBool>,
        quit: Arc<AtomicBool>,
    ) where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        let window = self.config.metrics_window;
        let mut metrics =
            TrainingMetrics::with_capacity(window, control.config().actions.len());
        let mut steps_per_tick = self.config.steps_per_tick.max(1);
        let tick_delay = Duration::from_millis(self.config.tick_delay_ms);
        let mut rate_start = Instant::now();
        let mut rate_steps = 0usize;

        if control.state() == LoopState::Idle {
            if let Err(e) = control.start() {
                error!(error = %e, "control loop failed to start");
                let _ = update_tx.send(TrainingUpdate::Error(e.to_string()));
                let _ = update_tx.send(TrainingUpdate::Finished);
                return;
            }
        }
        let _ = update_tx.send(TrainingUpdate::Values(control.values().snapshot()));

        while control.state() == LoopState::Running {
            if quit.load(Ordering::Relaxed) {
                break;
            }

            while let Ok(cmd) = cmd_rx.try_recv() {
                match cmd {
                    TrainingCommand::SaveCheckpoint => {
                        self.checkpoint_and_notify(control, &metrics, &update_tx);
                    }
                    TrainingCommand::SetStepsPerTick(n) => {
                        steps_per_tick = n.max(1);
                    }
                }
            }

            if pause.load(Ordering::Relaxed) {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }

            for _ in 0..steps_per_tick {
                if control.state() != LoopState::Running {
                    break;
                }
                let report = match control.step() {
                    Ok(report) => report,
                    Err(e) => {
                        let _ = update_tx.send(TrainingUpdate::Error(e.to_string()));
                        let _ = update_tx.send(TrainingUpdate::Finished);
                        return;
                    }
                };
                metrics.record_step(&report);
                rate_steps += 1;
                let step = report.step;

                if every(step, self.config.live_update_interval)
                    && update_tx.send(TrainingUpdate::Step(report)).is_err()
                {
                    return;
                }

                if every(step, self.config.snapshot_interval) {
                    let steps_per_sec = rate(rate_steps, rate_start.elapsed().as_secs_f32());
                    rate_start = Instant::now();
                    rate_steps = 0;
                    let _ = update_tx.send(TrainingUpdate::Metrics(self.metrics_snapshot(
                        control,
                        &metrics,
                        steps_per_sec,
                    )));
                    let _ = update_tx.send(TrainingUpdate::Values(control.values().snapshot()));
                }

                if every(step, self.config.checkpoint_interval) {
                    self.checkpoint_and_notify(control, &metrics, &update_tx);
                }
            }

            std::thread::sleep(tick_delay);
        }

        let _ = update_tx.send(TrainingUpdate::Metrics(self.metrics_snapshot(
            control, &metrics, 0.0,
        )));
        let _ = update_tx.send(TrainingUpdate::Values(control.values().snapshot()));
        let _ = update_tx.send(TrainingUpdate::Finished);
    }

    fn metrics_snapshot<S, E, V>(
        &self,
        control: &ControlLoop<S, E, V>,
        metrics: &TrainingMetrics,
        steps_per_sec: f32,
    ) -> MetricsSnapshot
    where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        let window = self.config.metrics_window;
        MetricsSnapshot {
            step: control.step_count(),
            max_steps: control.config().max_steps,
            episode: control.episode(),
            epsilon: control.policy().epsilon(),
            average_reward: metrics.average_reward(window),
            average_congestion: metrics.average_congestion(window),
            loss: metrics.average_loss(window),
            updates: control.values().update_count(),
            action_counts: metrics.action_counts().to_vec(),
            value_function: control.values().name().to_string(),
            steps_per_sec,
        }
    }

    fn checkpoint_and_notify<S, E, V>(
        &self,
        control: &ControlLoop<S, E, V>,
        metrics: &TrainingMetrics,
        update_tx: &Sender<TrainingUpdate>,
    ) where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        match self.save_checkpoint(control, metrics) {
            Ok(path) => {
                let _ = update_tx.send(TrainingUpdate::CheckpointSaved {
                    step: control.step_count(),
                    path,
                });
            }
            Err(e) => {
                let _ = update_tx.send(TrainingUpdate::Error(format!("checkpoint failed: {e}")));
            }
        }
    }

    /// Save the value function with the current rolling metrics.
    pub fn save_checkpoint<S, E, V>(
        &self,
        control: &ControlLoop<S, E, V>,
        metrics: &TrainingMetrics,
    ) -> Result<PathBuf, CheckpointError>
    where
        S: Simulator,
        E: StateEncoder,
        V: ValueFunction<State = E::State>,
    {
        let window = self.config.metrics_window;
        let ckpt_metrics = CheckpointMetrics {
            average_reward: metrics.average_reward(window),
            average_congestion: metrics.average_congestion(window),
            current_loss: metrics.average_loss(window),
            updates: control.values().update_count(),
        };
        let path = self.checkpoint_manager.save_checkpoint(
            control.values(),
            control.step_count(),
            control.episode(),
            control.policy().epsilon(),
            &ckpt_metrics,
        )?;
        info!(path = %path.display(), "checkpoint saved");
        Ok(path)
    }
}

fn every(step: usize, interval: usize) -> bool {
    interval > 0 && step % interval == 0
}

fn rate(steps: usize, seconds: f32) -> f32 {
    if seconds > 0.0 {
        steps as f32 / seconds
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;
    use crate::ai::policy::{EpsilonGreedy, PolicyConfig};
    use crate::ai::state_encoding::TabularEncoder;
    use crate::ai::value::{TabularConfig, TabularQ};
    use crate::sim::SyntheticNetwork;
    use crate::training::control_loop::ControlConfig;

    fn control(
        sim: SyntheticNetwork,
        max_steps: usize,
    ) -> ControlLoop<SyntheticNetwork, TabularEncoder, TabularQ> {
        let config = ControlConfig {
            max_steps,
            episode_steps: 10,
            ..Default::default()
        };
        ControlLoop::new(
            sim,
            TabularEncoder::new(10),
            TabularQ::new(TabularConfig::default(), 2),
            EpsilonGreedy::new(&PolicyConfig::default(), Some(5)),
            config,
        )
        .unwrap()
    }

    fn trainer(dir: &std::path::Path, checkpoint_interval: usize) -> Trainer {
        Trainer::new(
            TrainerConfig {
                checkpoint_interval,
                log_interval: 10,
                tick_delay_ms: 0,
                steps_per_tick: 5,
                snapshot_interval: 5,
                ..Default::default()
            },
            CheckpointManagerConfig {
                checkpoint_dir: dir.to_path_buf(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_every() {
        assert!(every(10, 5));
        assert!(!every(11, 5));
        assert!(!every(10, 0));
    }

    #[test]
    fn test_headless_runs_to_budget_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 20);
        let mut cl = control(SyntheticNetwork::from_queues(&[("A", &[2, 3])]), 40);

        let summary = trainer
            .run_headless(&mut cl, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.steps, 40);
        assert_eq!(summary.episodes, 4);
        assert!(dir.path().join("checkpoint_000000040").exists());
        assert!(dir.path().join("latest").exists());
    }

    #[test]
    fn test_resume_restores_counters_and_epsilon() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 20);
        let mut cl = control(SyntheticNetwork::from_queues(&[("A", &[2, 3])]), 20);
        cl.policy_mut().set_epsilon(0.33);
        trainer.run_headless(&mut cl, &AtomicBool::new(false)).unwrap();

        let mut fresh = control(SyntheticNetwork::from_queues(&[("A", &[2, 3])]), 100);
        let step = trainer.resume(&mut fresh).unwrap();
        assert_eq!(step, Some(20));
        assert_eq!(fresh.step_count(), 20);
        assert_eq!(fresh.episode(), 2);
        assert_eq!(fresh.values().len(), cl.values().len());
        assert_eq!(fresh.values().update_count(), cl.values().update_count());

        let saved_epsilon = cl.policy().epsilon();
        assert!(saved_epsilon < 0.33);
        assert!((fresh.policy().epsilon() - saved_epsilon).abs() < 1e-6);
    }

    #[test]
    fn test_resume_at_budget_runs_no_more_steps() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 20);
        let mut cl = control(SyntheticNetwork::from_queues(&[("A", &[2, 3])]), 20);
        trainer.run_headless(&mut cl, &AtomicBool::new(false)).unwrap();

        let mut fresh = control(SyntheticNetwork::from_queues(&[("A", &[2, 3])]), 20);
        assert_eq!(trainer.resume(&mut fresh).unwrap(), Some(20));
        assert_eq!(fresh.state(), LoopState::Finished);

        let summary = trainer
            .run_headless(&mut fresh, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.steps, 20);
        assert_eq!(fresh.step_count(), 20);
    }

    #[test]
    fn test_resume_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 0);
        let mut cl = control(SyntheticNetwork::from_queues(&[("A", &[1])]), 10);
        assert_eq!(trainer.resume(&mut cl).unwrap(), None);
    }

    #[test]
    fn test_headless_propagates_simulator_failure() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 0);
        let sim = SyntheticNetwork::from_queues(&[("A", &[1])]).disconnect_after(3);
        let mut cl = control(sim, 100);
        let result = trainer.run_headless(&mut cl, &AtomicBool::new(false));
        assert!(matches!(result, Err(ControlError::SimulatorUnavailable(_))));
    }

    #[test]
    fn test_dashboard_publishes_snapshots_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 0);
        let mut cl = control(SyntheticNetwork::from_queues(&[("A", &[1, 2])]), 12);
        let (update_tx, update_rx) = mpsc::channel();
        let (_cmd_tx, cmd_rx) = mpsc::channel();

        trainer.run_with_dashboard(
            &mut cl,
            update_tx,
            cmd_rx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        );

        let updates: Vec<TrainingUpdate> = update_rx.try_iter().collect();
        let steps = updates
            .iter()
            .filter(|u| matches!(u, TrainingUpdate::Step(_)))
            .count();
        assert_eq!(steps, 12);
        assert!(updates
            .iter()
            .any(|u| matches!(u, TrainingUpdate::Values(v) if v.kind == "TabularQ")));
        assert!(matches!(updates.last(), Some(TrainingUpdate::Finished)));
    }

    #[test]
    fn test_dashboard_reports_error_then_finished() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = trainer(dir.path(), 0);
        let sim = SyntheticNetwork::from_queues(&[("A", &[1])]).disconnect_after(2);
        let mut cl = control(sim, 100);
        let (update_tx, update_rx) = mpsc::channel();
        let (_cmd_tx, cmd_rx) = mpsc::channel();

        trainer.run_with_dashboard(
            &mut cl,
            update_tx,
            cmd_rx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicBool::new(false)),
        );

        let updates: Vec<TrainingUpdate> = update_rx.try_iter().collect();
        assert!(updates.iter().any(|u| matches!(u, TrainingUpdate::Error(_))));
        assert!(matches!(updates.last(), Some(TrainingUpdate::Finished)));
    }
}
