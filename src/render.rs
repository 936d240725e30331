//! Plain-text rendering of gridworlds, Q-functions and policies

use std::fmt::Write;

use crate::environment::Movement;
use crate::grid::Grid;

pub const OUTPUT_WIDTH: usize = 90;
pub const BOUNDARY_CHAR: char = '█';
const MIN_NUMBER_PADDING: usize = 5;

/// Display character of a field label.
pub fn field_char(label: char) -> char {
    match label {
        'F' => ' ',
        'O' => '■',
        'E' => '+',
        'P' => '-',
        other => other,
    }
}

pub fn action_char(movement: Option<Movement>) -> char {
    match movement {
        Some(Movement::UP) => '↑',
        Some(Movement::RIGHT) => '→',
        Some(Movement::DOWN) => '↓',
        Some(Movement::LEFT) => '←',
        Some(_) => '?',
        None => ' ',
    }
}

pub fn separator(spacing_top: bool, spacing_bottom: bool) -> String {
    let mut out = String::new();
    if spacing_top {
        out.push('\n');
    }
    let _ = writeln!(out, "#{:-<w$}#", "", w = OUTPUT_WIDTH);
    if spacing_bottom {
        out.push('\n');
    }
    out
}

pub fn headline(text: &str) -> String {
    let mut out = separator(true, false);
    let _ = writeln!(out, "|{:^w$}|", text, w = OUTPUT_WIDTH);
    out.push_str(&separator(false, true));
    out
}

pub fn gridworld(grid: &Grid) -> String {
    // Two characters per field plus one boundary on each side.
    let border: String = std::iter::repeat(BOUNDARY_CHAR)
        .take(2 * grid.width() + 2)
        .collect();
    let mut out = String::from("\n");
    let _ = writeln!(out, "{}", border);
    for row in grid.rows() {
        out.push(BOUNDARY_CHAR);
        for label in row {
            out.push(field_char(*label));
            out.push(' ');
        }
        out.push(BOUNDARY_CHAR);
        out.push('\n');
    }
    let _ = writeln!(out, "{}", border);
    out.push('\n');
    out
}

pub fn policy(rows: &[Vec<Option<Movement>>]) -> String {
    let mut out = String::from("\n");
    for row in rows {
        out.push(' ');
        for movement in row {
            out.push(action_char(*movement));
            out.push(' ');
        }
        out.push('\n');
    }
    out.push('\n');
    out
}

/// One box per field: the up value on top, left and right in the middle,
/// down at the bottom. `actions` says which column holds which move.
pub fn q_function(rows: &[Vec<Vec<f64>>], actions: &[Movement]) -> String {
    let value = |values: &[f64], movement: Movement| -> f64 {
        actions
            .iter()
            .position(|a| *a == movement)
            .and_then(|i| values.get(i).copied())
            .unwrap_or(0.0)
    };

    let values = || rows.iter().flatten().flatten();
    let largest = values().fold(0.0f64, |acc, v| acc.max(v.abs()));
    // Signs count towards the width, one space of margin on top.
    let widest = values().map(|v| format!("{:.3}", v).len()).max().unwrap_or(0);
    let p = (MIN_NUMBER_PADDING + format!("{}", largest.round()).len()).max(widest + 1);
    let width = rows.first().map_or(0, |row| row.len()) * (2 * p + 4) + 1;
    let rule = format!("{:-<w$}\n", "", w = width);

    let mut out = format!("\n{}", rule);
    for row in rows {
        out.push('|');
        for values in row {
            let _ = write!(out, "  {:^w$.3} |", value(values, Movement::UP), w = 2 * p);
        }
        out.push_str("\n|");
        for values in row {
            let _ = write!(
                out,
                "{:>p$.3} | {:<p$.3}|",
                value(values, Movement::LEFT),
                value(values, Movement::RIGHT),
                p = p
            );
        }
        out.push_str("\n|");
        for values in row {
            let _ = write!(out, "  {:^w$.3} |", value(values, Movement::DOWN), w = 2 * p);
        }
        out.push('\n');
        out.push_str(&rule);
    }
    out.push('\n');
    out
}
