//! Per-agent append-only round memory.

use serde::{Deserialize, Serialize};

/// What an agent remembers across rounds: its own moves, the opponent's
/// moves, and the payoff earned each round. One entry per completed round
/// in each list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub moves: Vec<String>,
    pub opponent_moves: Vec<String>,
    pub payoffs: Vec<f64>,
}

impl Memory {
    /// True when every completed round has all three entries.
    pub fn is_round_consistent(&self) -> bool {
        self.moves.len() == self.opponent_moves.len()
            && self.opponent_moves.len() == self.payoffs.len()
    }
}
