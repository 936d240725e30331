//! Gridworld layout files
//!
//! One row per line, every non-whitespace character is the label of a field.

use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Rectangular matrix of field labels, indexed `[y][x]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<char>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<char>>) -> Result<Self> {
        let width = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(Error::EmptyGrid),
        };
        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::RaggedGrid {
                    row: y,
                    expected: width,
                    got: row.len(),
                });
            }
        }
        Ok(Self { rows })
    }

    /// Lines without any label are skipped, so trailing blank lines are fine.
    pub fn parse(text: &str) -> Result<Self> {
        let rows: Vec<Vec<char>> = text
            .lines()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>())
            .filter(|row| !row.is_empty())
            .collect();
        Self::new(rows)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            operation: format!("read gridworld {}", path.display()),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn width(&self) -> usize {
        self.rows[0].len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<char>] {
        &self.rows
    }
}
