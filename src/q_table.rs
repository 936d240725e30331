//! Dense action-value table
//!
//! One row per state index, one column per action index. The shape is fixed
//! at construction, so every (state, action) pair always has a value.

use ndarray::{Array2, ArrayView1};
use ordered_float::OrderedFloat;

#[derive(Debug, Clone, PartialEq)]
pub struct QTable {
    values: Array2<f64>,
}

impl QTable {
    pub fn new(num_states: usize, num_actions: usize) -> Self {
        Self {
            values: Array2::zeros((num_states, num_actions)),
        }
    }

    pub fn num_states(&self) -> usize {
        self.values.nrows()
    }

    pub fn num_actions(&self) -> usize {
        self.values.ncols()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, state: usize, action: usize) -> f64 {
        self.values[[state, action]]
    }

    pub fn set(&mut self, state: usize, action: usize, value: f64) {
        self.values[[state, action]] = value;
    }

    /// All action values of one state, in action order.
    pub fn row(&self, state: usize) -> ArrayView1<'_, f64> {
        self.values.row(state)
    }

    pub fn max_value(&self, state: usize) -> f64 {
        self.values
            .row(state)
            .iter()
            .copied()
            .map(OrderedFloat)
            .max()
            .map_or(0.0, OrderedFloat::into_inner)
    }

    /// Index of the best action; the first one wins ties.
    pub fn greedy_action(&self, state: usize) -> usize {
        let row = self.values.row(state);
        let mut best = 0;
        for (action, value) in row.iter().enumerate().skip(1) {
            if *value > row[best] {
                best = action;
            }
        }
        best
    }

    pub fn reset(&mut self) {
        self.values.fill(0.0);
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }
}

/// Round half away from zero to `decimal_places`. Precision the f64 cannot
/// represent leaves `value` as it is.
pub fn round_to(value: f64, decimal_places: u32) -> f64 {
    let factor = match i32::try_from(decimal_places) {
        Ok(places) => 10f64.powi(places),
        Err(_) => return value,
    };
    let scaled = value * factor;
    if !scaled.is_finite() {
        return value;
    }
    scaled.round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_table_is_dense_and_zero() {
        let table = QTable::new(11, 4);
        assert_eq!(table.len(), 44);
        assert!(table.values().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn greedy_action_prefers_first_on_ties() {
        let mut table = QTable::new(1, 4);
        assert_eq!(table.greedy_action(0), 0);
        table.set(0, 1, 0.5);
        table.set(0, 3, 0.5);
        assert_eq!(table.greedy_action(0), 1);
        table.set(0, 0, -1.0);
        table.set(0, 1, -1.0);
        table.set(0, 2, -1.0);
        table.set(0, 3, -2.0);
        assert_eq!(table.greedy_action(0), 0);
    }

    #[test]
    fn max_value_over_negative_row() {
        let mut table = QTable::new(2, 3);
        table.set(1, 0, -0.3);
        table.set(1, 1, -0.1);
        table.set(1, 2, -0.2);
        assert_eq!(table.max_value(1), -0.1);
        assert_eq!(table.max_value(0), 0.0);
    }

    #[test]
    fn reset_zeroes_every_entry() {
        let mut table = QTable::new(3, 4);
        table.set(2, 3, 7.5);
        table.reset();
        assert_eq!(table, QTable::new(3, 4));
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.123456, 5), 0.12346);
        assert_eq!(round_to(-0.0200004, 5), -0.02);
        assert_eq!(round_to(0.55000000000000004, 5), 0.55);
    }

    #[test]
    fn rounding_beyond_f64_precision_keeps_value() {
        assert_eq!(round_to(0.123456, 400), 0.123456);
        assert_eq!(round_to(-0.02, 3_000_000_000), -0.02);
        assert_eq!(round_to(0.0, 400), 0.0);
    }
}
