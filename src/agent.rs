use crate::environment::Pos;

/// Where the learning agent currently stands, plus what it collected since
/// it was last placed.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub pos: Pos,
    pub reward: f64,
    pub steps: usize,
}

impl Agent {
    pub fn new(pos: Pos) -> Self {
        Self {
            pos,
            reward: 0.0,
            steps: 0,
        }
    }

    pub fn place(&mut self, pos: Pos) {
        *self = Agent::new(pos);
    }

    pub fn r#move(&mut self, reward: f64, new_pos: Pos) {
        self.reward += reward;
        self.steps += 1;
        self.pos = new_pos;
    }
}
