//! Error types for the gridworld crate

use thiserror::Error;

use crate::environment::{Movement, Pos};

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid action ({}, {}): not part of the action set", .movement.dx, .movement.dy)]
    InvalidAction { movement: Movement },

    #[error("invalid state ({}, {}): not a reachable field", .pos.x, .pos.y)]
    InvalidState { pos: Pos },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("{name} must be within [{min}, {max}], got {value}")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("gridworld is empty")]
    EmptyGrid,

    #[error("gridworld row {row} has {got} fields, expected {expected}")]
    RaggedGrid {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("gridworld has no reachable fields")]
    NoValidStates,

    #[error("gridworld has no goal fields")]
    NoGoalStates,

    #[error("no reward defined for field '{label}' at ({x}, {y})")]
    UnknownLabel { label: char, x: usize, y: usize },

    #[error("failed to {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("background learning worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            operation: "IO operation".to_string(),
            source,
        }
    }
}
