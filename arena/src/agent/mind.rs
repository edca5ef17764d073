//! The per-round decision cycle: act, observe, think.
//!
//! Strict order within a round: `act` picks and records this agent's move,
//! `observe` records the opponent's move once it is known, and `think`
//! computes the round payoff and asserts the opponent's move into engine
//! state for the next round. Failures set `RuntimeError` instead of
//! returning errors, so the orchestrator can exclude the pair and move on.

use tracing::{debug, instrument, warn};

use crate::agent::{Agent, AgentStatus};

impl Agent {
    /// Let the strategy rules choose this round's move and record it.
    /// Returns `None` (and sets `RuntimeError`) on any failure; no move is
    /// recorded in that case.
    #[instrument(skip_all, fields(agent = %self.name()))]
    pub fn act(&mut self) -> Option<String> {
        if self.solver.is_released() || self.game.players.is_empty() {
            warn!("act called on an unready agent");
            self.set_status(AgentStatus::RuntimeError);
            return None;
        }
        let own = self.game.players[0].clone();
        let result = self.solver.select_move(&own);
        let Some(mv) = result.first().map(str::to_string) else {
            warn!(error = ?result.error, "move selection failed");
            self.set_status(AgentStatus::RuntimeError);
            return None;
        };
        debug!(mv, "selected move");
        self.memory.moves.push(mv.clone());
        Some(mv)
    }

    /// Record the opponent's move for this round.
    pub fn observe(&mut self, opponent_move: &str) -> bool {
        if self.solver.is_released() {
            warn!(agent = %self.name(), "observe called on a released agent");
            self.set_status(AgentStatus::RuntimeError);
            return false;
        }
        self.memory.opponent_moves.push(opponent_move.to_string());
        true
    }

    /// Close the round: compute the payoff for the last pair of moves and
    /// assert the opponent's move into engine state for the next round.
    /// The payoff is appended only after every sub-step succeeded.
    #[instrument(skip_all, fields(agent = %self.name()))]
    pub fn think(&mut self) -> bool {
        let (Some(own_move), Some(opponent_move)) = (
            self.memory.moves.last().cloned(),
            self.memory.opponent_moves.last().cloned(),
        ) else {
            warn!("think called before act and observe");
            self.set_status(AgentStatus::RuntimeError);
            return false;
        };
        if self.game.players.len() < 2 {
            warn!("think called without a known opponent");
            self.set_status(AgentStatus::RuntimeError);
            return false;
        }
        let own = self.game.players[0].clone();
        let opponent = self.game.players[1].clone();

        let result = self
            .solver
            .calculate_payoff(&own, &opponent, &own_move, &opponent_move);
        let payoff: f64 = match result.first().map(str::parse) {
            Some(Ok(payoff)) => payoff,
            _ => {
                warn!(error = ?result.error, "payoff calculation failed");
                self.set_status(AgentStatus::RuntimeError);
                return false;
            }
        };

        let update = self
            .solver
            .update_opponent_last_move(&opponent, &opponent_move);
        if !update.success {
            warn!(error = ?update.error, "failed to assert opponent move");
            self.set_status(AgentStatus::RuntimeError);
            return false;
        }

        debug!(payoff, "round closed");
        self.memory.payoffs.push(payoff);
        true
    }

    /// Sum of all round payoffs so far.
    pub fn total_payoff(&self) -> f64 {
        self.memory.payoffs.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::agent::{Agent, AgentStatus, RuleSource};
    use crate::test_support::{
        ALWAYS_DEFECT_RULES, FakeGameEngine, FakeStrategy, PD_GAME_RULES, TIT_FOR_TAT_RULES,
        engine_factory,
    };

    fn agent_with(strategy: FakeStrategy, strategy_rules: &str) -> Agent {
        let mut agent = Agent::new(
            engine_factory(FakeGameEngine::prisoners_dilemma(strategy)),
            None,
        )
        .expect("agent");
        agent
            .initialize(
                RuleSource::Text(PD_GAME_RULES.to_string()),
                RuleSource::Text(strategy_rules.to_string()),
                None,
            )
            .expect("initialize");
        agent
    }

    #[test]
    fn a_full_round_records_all_three_entries() {
        let mut agent = agent_with(
            FakeStrategy::Always("defect".to_string()),
            ALWAYS_DEFECT_RULES,
        );
        let mv = agent.act().expect("move");
        assert_eq!(mv, "defect");
        assert!(agent.observe("cooperate"));
        assert!(agent.think());
        assert!(agent.memory().is_round_consistent());
        assert_eq!(agent.total_payoff(), 5.0);
        assert_eq!(agent.status(), AgentStatus::Correct);
    }

    #[test]
    fn tit_for_tat_repeats_the_observed_move() {
        let mut agent = agent_with(FakeStrategy::TitForTat, TIT_FOR_TAT_RULES);
        assert_eq!(agent.act().as_deref(), Some("defect"));
        assert!(agent.observe("cooperate"));
        assert!(agent.think());
        // Next round's selection follows the asserted opponent move.
        assert_eq!(agent.act().as_deref(), Some("cooperate"));
    }

    #[test]
    fn act_on_a_released_agent_sets_runtime_error() {
        let mut agent = agent_with(
            FakeStrategy::Always("defect".to_string()),
            ALWAYS_DEFECT_RULES,
        );
        agent.release();
        assert_eq!(agent.act(), None);
        assert_eq!(agent.status(), AgentStatus::RuntimeError);
        assert!(agent.memory().moves.is_empty());
    }

    #[test]
    fn failed_selection_records_no_move() {
        let mut agent = agent_with(FakeStrategy::Fail, ALWAYS_DEFECT_RULES);
        assert_eq!(agent.act(), None);
        assert_eq!(agent.status(), AgentStatus::RuntimeError);
        assert!(agent.memory().moves.is_empty());
    }

    #[test]
    fn think_before_act_is_a_runtime_error() {
        let mut agent = agent_with(
            FakeStrategy::Always("defect".to_string()),
            ALWAYS_DEFECT_RULES,
        );
        assert!(!agent.think());
        assert_eq!(agent.status(), AgentStatus::RuntimeError);
        assert!(agent.memory().payoffs.is_empty());
    }

    #[test]
    fn unknown_move_pair_fails_without_a_payoff() {
        let mut agent = agent_with(
            FakeStrategy::Always("defect".to_string()),
            ALWAYS_DEFECT_RULES,
        );
        agent.act().expect("move");
        assert!(agent.observe("betray"));
        assert!(!agent.think());
        assert_eq!(agent.status(), AgentStatus::RuntimeError);
        assert!(agent.memory().payoffs.is_empty());
    }
}
