#![recursion_limit = "256"]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tracing_subscriber::EnvFilter;

use traffic_signal_rl::ai::{
    ApproximateQ, EpsilonGreedy, NetworkApproximator, StateEncoder, TabularEncoder, TabularQ,
    ValueFunction, VectorEncoder,
};
use traffic_signal_rl::config::AppConfig;
use traffic_signal_rl::error::ControlError;
use traffic_signal_rl::sim::SyntheticNetwork;
use traffic_signal_rl::training::control_loop::ControlLoop;
use traffic_signal_rl::training::dashboard_msg::{TrainingCommand, TrainingUpdate};
use traffic_signal_rl::training::trainer::Trainer;
use traffic_signal_rl::ui::training_dashboard::{DashboardState, TrainingStatus};
use traffic_signal_rl::ui::training_view;

/// Train traffic-signal agents against the synthetic network.
#[derive(Parser)]
#[command(name = "train", about = "Train RL traffic-signal controllers")]
struct Cli {
    /// Value function to train: tabular or approx
    #[arg(long, default_value = "tabular")]
    algorithm: String,

    /// Resume training from the latest checkpoint
    #[arg(long)]
    resume: bool,

    /// Run in headless mode (log output, no TUI dashboard)
    #[arg(long)]
    headless: bool,

    /// Path to TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the total number of control steps
    #[arg(long)]
    steps: Option<usize>,

    /// Seed the policy, replay sampling and synthetic network
    #[arg(long)]
    seed: Option<u64>,

    /// Print the default configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

type Built<E, V> = Result<ControlLoop<SyntheticNetwork, E, V>, ControlError>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }

    match cli.algorithm.as_str() {
        "tabular" | "approx" => {}
        other => bail!("unknown algorithm '{}' (expected 'tabular' or 'approx')", other),
    }

    // The dashboard owns the terminal, so only headless runs log.
    if cli.headless {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    let mut app_config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;

    if let Some(steps) = cli.steps {
        app_config.control.max_steps = steps;
    }
    if let Some(seed) = cli.seed {
        app_config.control.seed = Some(seed);
        app_config.synthetic.seed = Some(seed);
    }
    app_config.validate().context("validating config")?;

    match cli.algorithm.as_str() {
        "tabular" => run(&cli, app_config, "TabularQ", build_tabular),
        "approx" => run(&cli, app_config, "ApproximateQ", build_approx),
        _ => unreachable!(),
    }
}

fn build_tabular(config: &AppConfig) -> Built<TabularEncoder, TabularQ> {
    let num_actions = config.control.actions.len();
    ControlLoop::new(
        SyntheticNetwork::new(&config.synthetic),
        TabularEncoder::new(config.tabular.state_cap),
        TabularQ::new(config.tabular.clone(), num_actions),
        EpsilonGreedy::new(&config.policy, config.control.seed),
        config.control.clone(),
    )
}

fn build_approx(config: &AppConfig) -> Built<VectorEncoder, ApproximateQ<NetworkApproximator>> {
    let num_actions = config.control.actions.len();
    let model = NetworkApproximator::new(&config.approx, num_actions);
    let values = match config.control.seed {
        Some(seed) => ApproximateQ::with_seed(model, &config.approx, seed),
        None => ApproximateQ::new(model, &config.approx),
    };
    ControlLoop::new(
        SyntheticNetwork::new(&config.synthetic),
        VectorEncoder::new(config.approx.state_size, config.approx.features),
        values,
        EpsilonGreedy::new(&config.policy, config.control.seed),
        config.control.clone(),
    )
}

fn run<E, V>(
    cli: &Cli,
    config: AppConfig,
    value_function: &str,
    build: fn(&AppConfig) -> Built<E, V>,
) -> Result<()>
where
    E: StateEncoder + 'static,
    V: ValueFunction<State = E::State> + 'static,
{
    if cli.headless {
        let mut control = build(&config).context("building control loop")?;
        let trainer = Trainer::new(config.training.clone(), config.checkpoint.clone());
        if cli.resume {
            trainer
                .resume(&mut control)
                .context("resuming from checkpoint")?;
        }
        let stop = AtomicBool::new(false);
        trainer
            .run_headless(&mut control, &stop)
            .context("training run failed")?;
        Ok(())
    } else {
        run_dashboard(config, value_function, cli.resume, build)
    }
}

fn run_dashboard<E, V>(
    config: AppConfig,
    value_function: &str,
    resume: bool,
    build: fn(&AppConfig) -> Built<E, V>,
) -> Result<()>
where
    E: StateEncoder + 'static,
    V: ValueFunction<State = E::State> + 'static,
{
    let action_labels = config.control.actions.labels();
    let mut dashboard =
        DashboardState::new(config.control.max_steps, value_function, action_labels);
    dashboard.steps_per_tick = config.training.steps_per_tick.max(1);

    let (update_tx, update_rx) = mpsc::channel::<TrainingUpdate>();
    let (cmd_tx, cmd_rx) = mpsc::channel::<TrainingCommand>();

    let pause = Arc::new(AtomicBool::new(false));
    let quit = Arc::new(AtomicBool::new(false));

    let pause_clone = pause.clone();
    let quit_clone = quit.clone();

    // The loop is built on the worker so the value function never crosses
    // threads.
    let training_handle = std::thread::spawn(move || {
        let mut control = match build(&config) {
            Ok(control) => control,
            Err(e) => {
                let _ = update_tx.send(TrainingUpdate::Error(e.to_string()));
                let _ = update_tx.send(TrainingUpdate::Finished);
                return;
            }
        };
        let trainer = Trainer::new(config.training.clone(), config.checkpoint.clone());
        if resume {
            if let Err(e) = trainer.resume(&mut control) {
                let _ = update_tx.send(TrainingUpdate::Error(format!("resume failed: {e}")));
            }
        }
        trainer.run_with_dashboard(&mut control, update_tx, cmd_rx, pause_clone, quit_clone);
    });

    run_dashboard_ui(&mut dashboard, update_rx, cmd_tx, pause, quit)?;

    let _ = training_handle.join();
    Ok(())
}

fn run_dashboard_ui(
    dashboard: &mut DashboardState,
    update_rx: mpsc::Receiver<TrainingUpdate>,
    cmd_tx: mpsc::Sender<TrainingCommand>,
    pause: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
) -> Result<()> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("creating terminal")?;

    let frame_duration = Duration::from_millis(100);

    loop {
        while let Ok(update) = update_rx.try_recv() {
            dashboard.apply(update);
        }

        terminal
            .draw(|f| training_view::render(f, &*dashboard))
            .context("drawing dashboard")?;

        if event::poll(frame_duration).unwrap_or(false) {
            if let Ok(Event::Key(key)) = event::read() {
                match key.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => {
                        quit.store(true, Ordering::Relaxed);
                        break;
                    }
                    KeyCode::Char('p') | KeyCode::Char('P') => {
                        if dashboard.status != TrainingStatus::Finished {
                            let was_paused = pause.load(Ordering::Relaxed);
                            pause.store(!was_paused, Ordering::Relaxed);
                            dashboard.status = if was_paused {
                                TrainingStatus::Running
                            } else {
                                TrainingStatus::Paused
                            };
                        }
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => {
                        let _ = cmd_tx.send(TrainingCommand::SaveCheckpoint);
                    }
                    KeyCode::Tab => dashboard.select_next_agent(),
                    KeyCode::Char('+') | KeyCode::Char('=') => {
                        let n = dashboard.faster();
                        let _ = cmd_tx.send(TrainingCommand::SetStepsPerTick(n));
                    }
                    KeyCode::Char('-') => {
                        let n = dashboard.slower();
                        let _ = cmd_tx.send(TrainingCommand::SetStepsPerTick(n));
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = disable_raw_mode();
    let _ = execute!(terminal.backend_mut(), LeaveAlternateScreen);
    let _ = terminal.show_cursor();
    Ok(())
}
