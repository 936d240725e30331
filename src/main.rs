use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use log::info;

use gridworld_rl::history::write_history_csv;
use gridworld_rl::menu::{self, Console, HEARTBEAT};
use gridworld_rl::{render, Config, Env, Grid, QLearning, TransitionProbabilities};

#[derive(Parser)]
#[command(name = "gridworld")]
#[command(version, about = "Tabular Q-learning on text gridworlds", long_about = None)]
struct Cli {
    /// Gridworld file, asked for interactively when missing
    grid: Option<PathBuf>,

    /// JSON file with environment and learning parameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    epsilon: Option<f64>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    discount_factor: Option<f64>,

    /// Probability of moving in the intended direction
    #[arg(long)]
    straight: Option<f64>,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive menu (default)
    Menu,

    /// Learn until the policy is stable, then print the results
    Converge {
        /// Episodes with an unchanged policy required
        #[arg(long)]
        threshold: Option<usize>,

        /// Write one CSV row per episode to this file
        #[arg(long)]
        history: Option<PathBuf>,
    },

    /// Run a fixed number of episodes, then print the results
    Episode {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
}

fn setup_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S%.3f]"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply()
        .context("failed to set up logging")?;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load configuration {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(epsilon) = cli.epsilon {
        config.learning.epsilon = epsilon;
    }
    if let Some(learning_rate) = cli.learning_rate {
        config.learning.learning_rate = learning_rate;
    }
    if let Some(discount_factor) = cli.discount_factor {
        config.learning.discount_factor = discount_factor;
    }
    if let Some(straight) = cli.straight {
        config.environment.transition_probabilities = TransitionProbabilities {
            straight,
            lateral: (1.0 - straight) / 2.0,
        };
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    let config = load_config(&cli)?;

    let stdin = io::stdin();
    let mut console = Console::new(stdin.lock(), io::stdout());

    let grid_path = match &cli.grid {
        Some(path) => path.clone(),
        None => {
            console.print(&render::headline("Gridworld Selection"))?;
            console.ask_grid_path()?
        }
    };
    let grid = Grid::from_file(&grid_path)
        .with_context(|| format!("failed to load gridworld {}", grid_path.display()))?;
    let env = Env::new(grid, &config.environment).context("failed to set up the gridworld")?;
    let mut learner = QLearning::from_seed(env, config.learning.clone(), cli.seed)?;
    info!(
        "Loaded {}, straight move probability {}",
        grid_path.display(),
        learner.env().transition_probabilities().straight
    );

    match cli.command.unwrap_or(Commands::Menu) {
        Commands::Menu => {
            menu::run(&mut console, learner)?;
        }
        Commands::Converge { threshold, history } => {
            let threshold = threshold.unwrap_or(config.learning.convergence_threshold);
            if threshold == 0 {
                bail!("convergence threshold must be at least 1");
            }
            let outcome = menu::converge_with_heartbeat(
                console.output(),
                learner,
                threshold,
                HEARTBEAT,
                history.is_some(),
            )?;
            let report = outcome.result?;
            if let Some(path) = history {
                write_history_csv(&path, &outcome.history)
                    .with_context(|| format!("failed to write history {}", path.display()))?;
            }
            console.print(&menu::convergence_summary(
                report.episodes,
                report.converged_after().unwrap_or(report.episodes),
            ))?;
            console.print(&render::headline("Results"))?;
            console.print(&menu::q_function_and_policy(&outcome.learner))?;
        }
        Commands::Episode { count } => {
            for _ in 0..count {
                learner.episode()?;
            }
            console.print(&render::headline("Results"))?;
            console.print(&menu::q_function_and_policy(&learner))?;
        }
    }
    Ok(())
}
