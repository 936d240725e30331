use crate::q_table::QTable;

// Represents deterministic policy, one action index per state index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetPolicy {
    policy: Vec<usize>,
}

impl DetPolicy {
    /// Greedy policy of `q_table`. Ties go to the first action.
    pub fn from_q_table(q_table: &QTable) -> Self {
        Self {
            policy: (0..q_table.num_states())
                .map(|state| q_table.greedy_action(state))
                .collect(),
        }
    }

    pub fn action(&self, state: usize) -> usize {
        self.policy[state]
    }

    pub fn len(&self) -> usize {
        self.policy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policy.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.policy.iter().copied()
    }
}
