//! Environment and learning parameters
//!
//! Defaults reproduce the classic 3x4 gridworld setup: free fields cost a
//! little, `E` is the exit and `P` the pit.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    environment::Movement,
    error::{Error, Result},
};

const PROBABILITY_TOLERANCE: f64 = 1e-9;

/// Everything needed to build an environment and a learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: EnvConfig,
    pub learning: LearningParams,
}

impl Config {
    /// Load a JSON configuration file. Missing keys fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read configuration {}", path.display()),
            source,
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.environment.validate()?;
        self.learning.validate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionProbabilities {
    /// Probability of moving in the intended direction.
    pub straight: f64,
    /// Probability of each of the two perpendicular directions.
    pub lateral: f64,
}

impl Default for TransitionProbabilities {
    fn default() -> Self {
        Self {
            straight: 0.8,
            lateral: 0.1,
        }
    }
}

impl TransitionProbabilities {
    /// Deterministic movement, never slips sideways.
    pub fn deterministic() -> Self {
        Self {
            straight: 1.0,
            lateral: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("straight probability", self.straight)?;
        check_unit("lateral probability", self.lateral)?;
        let total = self.straight + 2.0 * self.lateral;
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(Error::InvalidConfiguration {
                message: format!("straight + 2 * lateral must be 1, got {}", total),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    pub field_rewards: BTreeMap<char, f64>,
    pub goal_fields: BTreeSet<char>,
    pub obstacle_fields: BTreeSet<char>,
    /// Order matters: it is the tie-breaking order of the greedy policy.
    pub actions: Vec<Movement>,
    pub transition_probabilities: TransitionProbabilities,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            field_rewards: [('F', -0.04), ('E', 1.0), ('P', -1.0)].into_iter().collect(),
            goal_fields: ['E', 'P'].into_iter().collect(),
            obstacle_fields: ['O'].into_iter().collect(),
            actions: Movement::actions(),
            transition_probabilities: TransitionProbabilities::default(),
        }
    }
}

impl EnvConfig {
    pub fn validate(&self) -> Result<()> {
        if self.actions.is_empty() {
            return Err(Error::InvalidConfiguration {
                message: "action set is empty".to_string(),
            });
        }
        for (i, a) in self.actions.iter().enumerate() {
            if self.actions[..i].contains(a) {
                return Err(Error::InvalidConfiguration {
                    message: format!("action ({}, {}) listed twice", a.dx, a.dy),
                });
            }
        }
        self.transition_probabilities.validate()
    }
}

/// Hyper-parameters of the learner. They stay mutable for the whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningParams {
    /// Discount factor γ
    pub discount_factor: f64,
    /// Learning rate α
    pub learning_rate: f64,
    /// Exploration rate ε of the epsilon-soft policy
    pub epsilon: f64,
    /// Episodes with an unchanged policy before it counts as converged
    pub convergence_threshold: usize,
    /// Q-values are rounded to this many decimal places after every update
    pub decimal_places: u32,
    /// Truncate an episode after this many steps without reaching a goal
    pub max_episode_steps: Option<usize>,
}

/// Beyond this an f64 carries no further decimal digits.
pub const MAX_DECIMAL_PLACES: u32 = 15;

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            discount_factor: 1.0,
            learning_rate: 0.1,
            epsilon: 0.5,
            convergence_threshold: 100,
            decimal_places: 5,
            max_episode_steps: None,
        }
    }
}

impl LearningParams {
    pub fn validate(&self) -> Result<()> {
        check_unit("discount factor", self.discount_factor)?;
        check_unit("learning rate", self.learning_rate)?;
        check_unit("epsilon", self.epsilon)?;
        check_threshold(self.convergence_threshold)?;
        if self.decimal_places > MAX_DECIMAL_PLACES {
            return Err(Error::ParameterOutOfRange {
                name: "decimal places",
                value: f64::from(self.decimal_places),
                min: 0.0,
                max: f64::from(MAX_DECIMAL_PLACES),
            });
        }
        if self.max_episode_steps == Some(0) {
            return Err(Error::InvalidConfiguration {
                message: "max episode steps must be positive".to_string(),
            });
        }
        Ok(())
    }
}

pub(crate) fn check_unit(name: &'static str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::ParameterOutOfRange {
            name,
            value,
            min: 0.0,
            max: 1.0,
        });
    }
    Ok(())
}

pub(crate) fn check_threshold(threshold: usize) -> Result<()> {
    if threshold == 0 {
        return Err(Error::InvalidConfiguration {
            message: "convergence threshold must be at least 1".to_string(),
        });
    }
    Ok(())
}
