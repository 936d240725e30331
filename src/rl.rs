use std::ops::ControlFlow;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::agent::Agent;
use crate::config::{check_threshold, check_unit, LearningParams};
use crate::environment::{Env, Movement, Pos};
use crate::error::{Error, Result};
use crate::history::EpisodeRecord;
use crate::policy::DetPolicy;
use crate::q_table::{round_to, QTable};

/// Epsilon-soft action choice: with probability epsilon a uniformly random
/// action (the greedy one included), otherwise the greedy action.
#[derive(Debug, Clone, Copy)]
pub struct EpsilonGreedy {
    epsilon: f64,
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64) -> Self {
        EpsilonGreedy { epsilon }
    }

    pub fn next_action<R: Rng + ?Sized>(
        &self,
        state: usize,
        q_table: &QTable,
        rng: &mut R,
    ) -> usize {
        if rng.gen::<f64>() < self.epsilon {
            return rng.gen_range(0..q_table.num_actions());
        }
        q_table.greedy_action(state)
    }
}

/// What a single learning step observed and wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub state: Pos,
    pub action: Movement,
    pub reward: f64,
    pub next_state: Pos,
    /// max Q of the follow-up state, or 0 when leaving a goal state
    pub bootstrap: f64,
    pub q_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeSummary {
    pub start: Pos,
    pub steps: usize,
    pub total_reward: f64,
    /// False when the episode was cut off by `max_episode_steps`
    pub reached_goal: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub episodes: usize,
    pub threshold: usize,
    /// False when the run was stopped before the threshold was reached
    pub converged: bool,
}

impl ConvergenceReport {
    /// Episode after which the policy stopped changing.
    pub fn converged_after(&self) -> Option<usize> {
        self.converged.then(|| self.episodes - self.threshold)
    }
}

/// Tabular Q-learning over a gridworld. Sole owner and mutator of the
/// action-value table, the derived policy and the agent position.
pub struct QLearning<R = StdRng> {
    env: Env,
    params: LearningParams,
    q_table: QTable,
    policy: DetPolicy,
    agent: Agent,
    rng: R,
    last_convergence: Option<ConvergenceReport>,
}

impl QLearning<StdRng> {
    /// Seeded for reproducible runs, from OS entropy otherwise.
    pub fn from_seed(env: Env, params: LearningParams, seed: Option<u64>) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(env, params, rng)
    }
}

impl<R: Rng> QLearning<R> {
    pub fn new(env: Env, params: LearningParams, mut rng: R) -> Result<Self> {
        params.validate()?;
        let q_table = QTable::new(env.states().len(), env.actions().len());
        let policy = DetPolicy::from_q_table(&q_table);
        let start = random_state(&env, &mut rng);
        Ok(Self {
            env,
            params,
            q_table,
            policy,
            agent: Agent::new(start),
            rng,
            last_convergence: None,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn params(&self) -> &LearningParams {
        &self.params
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    pub fn policy(&self) -> &DetPolicy {
        &self.policy
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn current_state(&self) -> Pos {
        self.agent.pos
    }

    pub fn last_convergence(&self) -> Option<ConvergenceReport> {
        self.last_convergence
    }

    pub fn set_epsilon(&mut self, epsilon: f64) -> Result<()> {
        check_unit("epsilon", epsilon)?;
        self.params.epsilon = epsilon;
        Ok(())
    }

    pub fn set_learning_rate(&mut self, learning_rate: f64) -> Result<()> {
        check_unit("learning rate", learning_rate)?;
        self.params.learning_rate = learning_rate;
        Ok(())
    }

    pub fn set_discount_factor(&mut self, discount_factor: f64) -> Result<()> {
        check_unit("discount factor", discount_factor)?;
        self.params.discount_factor = discount_factor;
        Ok(())
    }

    pub fn set_convergence_threshold(&mut self, threshold: usize) -> Result<()> {
        check_threshold(threshold)?;
        self.params.convergence_threshold = threshold;
        Ok(())
    }

    /// Zero every Q-value. The policy is stale until `update_policy` runs.
    pub fn reset_q_function(&mut self) {
        self.q_table.reset();
    }

    /// Zero the Q-values and rederive the policy from them.
    pub fn reset(&mut self) {
        self.reset_q_function();
        self.update_policy();
    }

    pub fn update_policy(&mut self) {
        self.policy = DetPolicy::from_q_table(&self.q_table);
    }

    /// Put the agent on a uniformly random state.
    pub fn reset_current_state(&mut self) {
        let start = random_state(&self.env, &mut self.rng);
        self.agent.place(start);
    }

    pub fn place_agent(&mut self, pos: Pos) -> Result<()> {
        if !self.env.is_valid(pos) {
            return Err(Error::InvalidState { pos });
        }
        self.agent.place(pos);
        Ok(())
    }

    pub fn q_value(&self, pos: Pos, movement: Movement) -> Option<f64> {
        let state = self.env.state_index(pos)?;
        let action = self.env.action_index(movement)?;
        Some(self.q_table.get(state, action))
    }

    pub fn set_q_value(&mut self, pos: Pos, movement: Movement, value: f64) -> Result<()> {
        let state = self.env.state_index(pos).ok_or(Error::InvalidState { pos })?;
        let action = self
            .env
            .action_index(movement)
            .ok_or(Error::InvalidAction { movement })?;
        self.q_table.set(state, action, value);
        Ok(())
    }

    /// Action the current policy picks in `pos`.
    pub fn policy_action(&self, pos: Pos) -> Option<Movement> {
        let state = self.env.state_index(pos)?;
        Some(self.env.actions()[self.policy.action(state)])
    }

    /// Move the agent once and apply the Q-learning update to the pair it
    /// left from.
    pub fn step(&mut self) -> Result<StepOutcome> {
        let s = self.agent.pos;
        let s_idx = self.env.state_index(s).ok_or(Error::InvalidState { pos: s })?;
        let a_idx =
            EpsilonGreedy::new(self.params.epsilon).next_action(s_idx, &self.q_table, &mut self.rng);
        let a = self.env.actions()[a_idx];

        let (r, s_p) = self.env.transition(s, a, &mut self.rng)?;

        // Nothing accrues beyond the transition out of a terminal state.
        let bootstrap = if self.env.is_terminal(s) {
            0.0
        } else {
            let s_p_idx = self
                .env
                .state_index(s_p)
                .ok_or(Error::InvalidState { pos: s_p })?;
            self.q_table.max_value(s_p_idx)
        };

        let q = self.q_table.get(s_idx, a_idx);
        let t_d = r + self.params.discount_factor * bootstrap - q;
        let q_value = round_to(q + self.params.learning_rate * t_d, self.params.decimal_places);
        self.q_table.set(s_idx, a_idx, q_value);

        self.agent.r#move(r, s_p);
        trace!("{} --{}--> {} r={} Q={}", s, a, s_p, r, q_value);

        Ok(StepOutcome {
            state: s,
            action: a,
            reward: r,
            next_state: s_p,
            bootstrap,
            q_value,
        })
    }

    /// Run one episode from a random start state.
    pub fn episode(&mut self) -> Result<EpisodeSummary> {
        self.reset_current_state();
        self.run_episode()
    }

    pub fn episode_from(&mut self, start: Pos) -> Result<EpisodeSummary> {
        self.place_agent(start)?;
        self.run_episode()
    }

    fn run_episode(&mut self) -> Result<EpisodeSummary> {
        let start = self.agent.pos;
        let mut reached_goal = true;
        while !self.env.is_terminal(self.agent.pos) {
            if let Some(max_steps) = self.params.max_episode_steps {
                if self.agent.steps >= max_steps {
                    reached_goal = false;
                    break;
                }
            }
            self.step()?;
        }
        // The goal's reward is only observed when stepping out of it.
        if reached_goal {
            self.step()?;
        }
        self.update_policy();

        let summary = EpisodeSummary {
            start,
            steps: self.agent.steps,
            total_reward: self.agent.reward,
            reached_goal,
        };
        debug!(
            "Episode from {}: {} steps, reward {:.3}{}",
            summary.start,
            summary.steps,
            summary.total_reward,
            if reached_goal { "" } else { " (truncated)" }
        );
        Ok(summary)
    }

    /// Run episodes until the policy stays unchanged for `threshold`
    /// consecutive episodes.
    pub fn run_until_convergence(&mut self, threshold: usize) -> Result<ConvergenceReport> {
        self.run_until_convergence_with(threshold, |_| ControlFlow::Continue(()))
    }

    /// Like `run_until_convergence`, reporting every finished episode to
    /// `observer`. Returning `ControlFlow::Break` stops the run early.
    pub fn run_until_convergence_with<F>(
        &mut self,
        threshold: usize,
        mut observer: F,
    ) -> Result<ConvergenceReport>
    where
        F: FnMut(&EpisodeRecord) -> ControlFlow<()>,
    {
        check_threshold(threshold)?;
        let mut episodes = 0;
        let mut unchanged = 0;
        let mut converged = true;

        while unchanged < threshold {
            let old_policy = self.policy.clone();
            let summary = self.episode()?;
            episodes += 1;

            let policy_changed = old_policy != self.policy;
            if policy_changed {
                unchanged = 0;
            } else {
                unchanged += 1;
            }

            let record = EpisodeRecord {
                episode: episodes,
                start_x: summary.start.x,
                start_y: summary.start.y,
                steps: summary.steps,
                total_reward: summary.total_reward,
                policy_changed,
                unchanged_streak: unchanged,
                truncated: !summary.reached_goal,
            };
            if observer(&record).is_break() && unchanged < threshold {
                converged = false;
                break;
            }
        }

        let report = ConvergenceReport {
            episodes,
            threshold,
            converged,
        };
        match report.converged_after() {
            Some(after) => info!(
                "Calculated {} episodes, policy converged after {} episodes",
                episodes, after
            ),
            None => info!("Stopped after {} episodes without convergence", episodes),
        }
        self.last_convergence = Some(report);
        Ok(report)
    }

    /// Q-values per grid cell in action order, row by row. Obstacles get zeros.
    pub fn format_q_function(&self) -> Vec<Vec<Vec<f64>>> {
        let (width, height) = self.env.size();
        let num_actions = self.env.actions().len();
        (0..height)
            .map(|y| {
                (0..width)
                    .map(|x| match self.env.state_index(Pos::new(x, y)) {
                        Some(state) => self.q_table.row(state).to_vec(),
                        None => vec![0.0; num_actions],
                    })
                    .collect()
            })
            .collect()
    }

    /// Policy action per grid cell, row by row. Obstacles get `None`.
    pub fn format_policy(&self) -> Vec<Vec<Option<Movement>>> {
        let (width, height) = self.env.size();
        (0..height)
            .map(|y| (0..width).map(|x| self.policy_action(Pos::new(x, y))).collect())
            .collect()
    }
}

fn random_state<R: Rng + ?Sized>(env: &Env, rng: &mut R) -> Pos {
    // Env guarantees at least one state.
    *env.states().choose(rng).unwrap_or(&env.states()[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvConfig, TransitionProbabilities};
    use crate::grid::Grid;

    fn deterministic_env(text: &str) -> Env {
        let config = EnvConfig {
            transition_probabilities: TransitionProbabilities::deterministic(),
            ..EnvConfig::default()
        };
        Env::new(Grid::parse(text).unwrap(), &config).unwrap()
    }

    fn greedy_params() -> LearningParams {
        LearningParams {
            discount_factor: 1.0,
            learning_rate: 0.5,
            epsilon: 0.0,
            ..LearningParams::default()
        }
    }

    #[test]
    fn new_learner_has_dense_zero_table() {
        let env = deterministic_env("FFFE\nFOFP\nFFFF");
        let learner = QLearning::from_seed(env, LearningParams::default(), Some(0)).unwrap();
        assert_eq!(learner.q_table().len(), 11 * 4);
        assert!(learner.q_table().values().iter().all(|v| *v == 0.0));
        assert!(learner.env().is_valid(learner.current_state()));
        // All-zero table: the first action wins everywhere.
        assert!(learner.policy().iter().all(|a| a == 0));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let env = deterministic_env("FE");
        let params = LearningParams {
            learning_rate: -0.1,
            ..LearningParams::default()
        };
        assert!(QLearning::from_seed(env, params, Some(0)).is_err());
    }

    #[test]
    fn unrepresentable_rounding_precision_is_rejected() {
        let params = LearningParams {
            decimal_places: 400,
            ..greedy_params()
        };
        let result = QLearning::from_seed(deterministic_env("FFE"), params, Some(0));
        assert!(matches!(result, Err(Error::ParameterOutOfRange { .. })));
    }

    #[test]
    fn step_applies_rounded_update() {
        let env = deterministic_env("FFE");
        let mut learner = QLearning::from_seed(env, greedy_params(), Some(1)).unwrap();
        learner.place_agent(Pos::new(0, 0)).unwrap();

        // Greedy on an all-zero row picks Up, which bounces off the wall.
        let outcome = learner.step().unwrap();
        assert_eq!(outcome.action, Movement::UP);
        assert_eq!(outcome.next_state, Pos::new(0, 0));
        assert_eq!(outcome.reward, -0.04);
        assert_eq!(outcome.q_value, -0.02);
        assert_eq!(learner.q_value(Pos::new(0, 0), Movement::UP), Some(-0.02));

        // Up is now worse than the untried actions; Right comes next.
        let outcome = learner.step().unwrap();
        assert_eq!(outcome.action, Movement::RIGHT);
        assert_eq!(learner.current_state(), Pos::new(1, 0));
    }

    #[test]
    fn leaving_a_goal_ignores_future_value() {
        let env = deterministic_env("FEF");
        let mut learner = QLearning::from_seed(env, greedy_params(), Some(2)).unwrap();
        for movement in Movement::actions() {
            learner.set_q_value(Pos::new(0, 0), movement, 10.0).unwrap();
        }
        learner.set_q_value(Pos::new(1, 0), Movement::LEFT, 0.1).unwrap();
        learner.place_agent(Pos::new(1, 0)).unwrap();

        let outcome = learner.step().unwrap();
        assert_eq!(outcome.action, Movement::LEFT);
        assert_eq!(outcome.next_state, Pos::new(0, 0));
        assert_eq!(outcome.bootstrap, 0.0);
        assert_eq!(outcome.reward, 1.0);
        assert!((outcome.q_value - 0.55).abs() < 1e-12);
    }

    #[test]
    fn episode_takes_one_step_out_of_the_goal() {
        let env = deterministic_env("FE");
        let mut learner = QLearning::from_seed(env, greedy_params(), Some(3)).unwrap();
        let summary = learner.episode_from(Pos::new(1, 0)).unwrap();
        assert_eq!(summary.steps, 1);
        assert!(summary.reached_goal);
        assert_eq!(learner.q_value(Pos::new(1, 0), Movement::UP), Some(0.5));
        // The episode ends by rederiving the policy.
        assert_eq!(learner.policy_action(Pos::new(1, 0)), Some(Movement::UP));
    }

    #[test]
    fn episode_can_be_truncated() {
        // Zero rewards and no exploration: Up bounces forever.
        let mut config = EnvConfig {
            transition_probabilities: TransitionProbabilities::deterministic(),
            ..EnvConfig::default()
        };
        config.field_rewards.insert('F', 0.0);
        let env = Env::new(Grid::parse("FFE").unwrap(), &config).unwrap();
        let params = LearningParams {
            max_episode_steps: Some(25),
            ..greedy_params()
        };
        let mut learner = QLearning::from_seed(env, params, Some(4)).unwrap();
        let summary = learner.episode_from(Pos::new(0, 0)).unwrap();
        assert!(!summary.reached_goal);
        assert_eq!(summary.steps, 25);
        assert_eq!(learner.current_state(), Pos::new(0, 0));
    }

    #[test]
    fn update_policy_is_idempotent() {
        let env = deterministic_env("FFFE\nFOFP\nFFFF");
        let params = LearningParams {
            epsilon: 0.5,
            ..LearningParams::default()
        };
        let mut learner = QLearning::from_seed(env, params, Some(5)).unwrap();
        for _ in 0..20 {
            learner.episode().unwrap();
        }
        learner.update_policy();
        let first = learner.policy().clone();
        learner.update_policy();
        assert_eq!(&first, learner.policy());
    }

    #[test]
    fn reset_zeroes_values_and_policy() {
        let env = deterministic_env("FFFE\nFOFP\nFFFF");
        let mut learner = QLearning::from_seed(env, LearningParams::default(), Some(6)).unwrap();
        for _ in 0..10 {
            learner.episode().unwrap();
        }
        assert!(learner.q_table().values().iter().any(|v| *v != 0.0));
        learner.reset();
        assert_eq!(learner.q_table().len(), 11 * 4);
        assert!(learner.q_table().values().iter().all(|v| *v == 0.0));
        assert!(learner.policy().iter().all(|a| a == 0));
    }

    #[test]
    fn setters_validate_ranges() {
        let env = deterministic_env("FE");
        let mut learner = QLearning::from_seed(env, LearningParams::default(), Some(7)).unwrap();
        assert!(learner.set_epsilon(1.1).is_err());
        assert!(learner.set_learning_rate(-0.5).is_err());
        assert!(learner.set_convergence_threshold(0).is_err());
        learner.set_epsilon(0.25).unwrap();
        learner.set_discount_factor(0.9).unwrap();
        learner.set_convergence_threshold(3).unwrap();
        assert_eq!(learner.params().epsilon, 0.25);
        assert_eq!(learner.params().discount_factor, 0.9);
        assert_eq!(learner.params().convergence_threshold, 3);
    }

    #[test]
    fn unknown_positions_and_actions_are_rejected() {
        let env = deterministic_env("FOE");
        let mut learner = QLearning::from_seed(env, LearningParams::default(), Some(8)).unwrap();
        assert!(matches!(
            learner.place_agent(Pos::new(1, 0)),
            Err(Error::InvalidState { .. })
        ));
        assert!(matches!(
            learner.set_q_value(Pos::new(0, 0), Movement::new(2, 0), 1.0),
            Err(Error::InvalidAction { .. })
        ));
        assert_eq!(learner.q_value(Pos::new(1, 0), Movement::UP), None);
    }

    #[test]
    fn formatted_tables_cover_the_whole_grid() {
        let env = deterministic_env("FOE");
        let learner = QLearning::from_seed(env, LearningParams::default(), Some(9)).unwrap();
        let q = learner.format_q_function();
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].len(), 3);
        assert_eq!(q[0][1], vec![0.0; 4]);
        let policy = learner.format_policy();
        assert_eq!(policy[0], vec![Some(Movement::UP), None, Some(Movement::UP)]);
    }
}
