//! Tabular Q-learning on text gridworlds
//!
//! - `environment`: the gridworld MDP with its noisy transition function
//! - `rl`: the Q-learning engine, episodes and the convergence criterion
//! - `convergence`: the convergence search on a background worker
//! - `grid`, `render`, `menu`: layout files, text output and the console

pub mod agent;
pub mod config;
pub mod convergence;
pub mod environment;
pub mod error;
pub mod grid;
pub mod history;
pub mod menu;
pub mod policy;
pub mod q_table;
pub mod render;
pub mod rl;

pub use config::{Config, EnvConfig, LearningParams, TransitionProbabilities};
pub use environment::{Cell, Env, Movement, Pos};
pub use error::{Error, Result};
pub use grid::Grid;
pub use rl::{ConvergenceReport, EpisodeSummary, QLearning, StepOutcome};
