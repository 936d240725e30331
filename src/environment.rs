use std::collections::HashMap;
use std::fmt;

use log::info;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{EnvConfig, TransitionProbabilities};
use crate::error::{Error, Result};
use crate::grid::Grid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cell {
    Free(f64),
    Goal(f64),
    Obstacle,
}

impl Cell {
    pub fn reward(&self) -> Option<f64> {
        match self {
            Cell::Free(reward) | Cell::Goal(reward) => Some(*reward),
            Cell::Obstacle => None,
        }
    }
}

// Action
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Movement {
    pub dx: isize,
    pub dy: isize,
}

impl Movement {
    pub const UP: Movement = Movement { dx: 0, dy: -1 };
    pub const RIGHT: Movement = Movement { dx: 1, dy: 0 };
    pub const DOWN: Movement = Movement { dx: 0, dy: 1 };
    pub const LEFT: Movement = Movement { dx: -1, dy: 0 };

    pub const fn new(dx: isize, dy: isize) -> Self {
        Self { dx, dy }
    }

    pub fn into_vector(self) -> (isize, isize) {
        (self.dx, self.dy)
    }

    /// The four axis-aligned moves, in policy tie-breaking order.
    pub fn actions() -> Vec<Movement> {
        vec![Movement::UP, Movement::RIGHT, Movement::DOWN, Movement::LEFT]
    }

    /// Both perpendicular moves: (dx, dy) -> (dy, dx) and (-dy, -dx).
    pub fn laterals(self) -> [Movement; 2] {
        [
            Movement::new(self.dy, self.dx),
            Movement::new(-self.dy, -self.dx),
        ]
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Movement::UP => write!(f, "up"),
            Movement::RIGHT => write!(f, "right"),
            Movement::DOWN => write!(f, "down"),
            Movement::LEFT => write!(f, "left"),
            Movement { dx, dy } => write!(f, "({}, {})", dx, dy),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pos {
    pub x: usize,
    pub y: usize,
}

impl Pos {
    pub const fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }

    /// `None` when the move would leave the non-negative quadrant.
    pub fn offset(self, movement: Movement) -> Option<Pos> {
        let (dx, dy) = movement.into_vector();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        Some(Pos { x, y })
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The gridworld MDP: reachable states, their rewards and the noisy
/// transition function. Immutable once built.
#[derive(Debug, Clone)]
pub struct Env {
    grid: Grid,
    /// Indexed `[y][x]`, same shape as the grid.
    map: Vec<Vec<Cell>>,
    states: Vec<Pos>,
    state_index: HashMap<Pos, usize>,
    goal_states: Vec<Pos>,
    actions: Vec<Movement>,
    transition_probabilities: TransitionProbabilities,
}

impl Env {
    pub fn new(grid: Grid, config: &EnvConfig) -> Result<Self> {
        config.validate()?;

        let mut map = Vec::with_capacity(grid.height());
        let mut states = Vec::new();
        let mut goal_states = Vec::new();
        let mut goal_obstacles = Vec::new();

        for (y, row) in grid.rows().iter().enumerate() {
            let mut cells = Vec::with_capacity(row.len());
            for (x, &label) in row.iter().enumerate() {
                let pos = Pos::new(x, y);
                let is_goal = config.goal_fields.contains(&label);
                if config.obstacle_fields.contains(&label) {
                    if is_goal {
                        goal_obstacles.push(pos);
                    }
                    cells.push(Cell::Obstacle);
                    continue;
                }
                let reward = *config
                    .field_rewards
                    .get(&label)
                    .ok_or(Error::UnknownLabel { label, x, y })?;
                states.push(pos);
                if is_goal {
                    goal_states.push(pos);
                    cells.push(Cell::Goal(reward));
                } else {
                    cells.push(Cell::Free(reward));
                }
            }
            map.push(cells);
        }

        // Goal states have to be a subset of the reachable states.
        if let Some(pos) = goal_obstacles.first() {
            return Err(Error::InvalidConfiguration {
                message: format!("goal field at {} cannot be an obstacle", pos),
            });
        }
        if states.is_empty() {
            return Err(Error::NoValidStates);
        }
        if goal_states.is_empty() {
            return Err(Error::NoGoalStates);
        }

        let state_index = states.iter().enumerate().map(|(i, pos)| (*pos, i)).collect();

        info!(
            "Map setup: {}x{} gridworld, {} states, {} goal states",
            grid.width(),
            grid.height(),
            states.len(),
            goal_states.len()
        );

        Ok(Self {
            grid,
            map,
            states,
            state_index,
            goal_states,
            actions: config.actions.clone(),
            transition_probabilities: config.transition_probabilities,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// (width, height) of the underlying grid.
    pub fn size(&self) -> (usize, usize) {
        (self.grid.width(), self.grid.height())
    }

    pub fn states(&self) -> &[Pos] {
        &self.states
    }

    pub fn goal_states(&self) -> &[Pos] {
        &self.goal_states
    }

    pub fn actions(&self) -> &[Movement] {
        &self.actions
    }

    pub fn transition_probabilities(&self) -> TransitionProbabilities {
        self.transition_probabilities
    }

    pub fn state_index(&self, pos: Pos) -> Option<usize> {
        self.state_index.get(&pos).copied()
    }

    pub fn action_index(&self, movement: Movement) -> Option<usize> {
        self.actions.iter().position(|a| *a == movement)
    }

    pub fn cell(&self, pos: Pos) -> Option<Cell> {
        self.map.get(pos.y).and_then(|row| row.get(pos.x)).copied()
    }

    pub fn reward(&self, pos: Pos) -> Option<f64> {
        self.cell(pos).and_then(|cell| cell.reward())
    }

    pub fn is_valid(&self, pos: Pos) -> bool {
        self.state_index.contains_key(&pos)
    }

    pub fn is_terminal(&self, pos: Pos) -> bool {
        matches!(self.cell(pos), Some(Cell::Goal(_)))
    }

    /// Target of a move. Walls and obstacles keep the agent where it is.
    fn check_movement(&self, pos: Pos, movement: Movement) -> Pos {
        match pos.offset(movement) {
            Some(new_pos) if self.is_valid(new_pos) => new_pos,
            _ => pos,
        }
    }

    /// Performs `movement` from `pos`, returning the immediate reward and the
    /// follow-up state. The reward belongs to `pos`, the state being left.
    pub fn transition<R: Rng + ?Sized>(
        &self,
        pos: Pos,
        movement: Movement,
        rng: &mut R,
    ) -> Result<(f64, Pos)> {
        let reward = self.reward(pos).ok_or(Error::InvalidState { pos })?;
        if !self.actions.contains(&movement) {
            return Err(Error::InvalidAction { movement });
        }

        let mut chosen = movement;
        if rng.gen::<f64>() >= self.transition_probabilities.straight {
            let laterals = movement.laterals();
            chosen = laterals[rng.gen_range(0..laterals.len())];
        }

        Ok((reward, self.check_movement(pos, chosen)))
    }
}
