//! Solver: one engine session plus the three rule roles consulted into it.
//!
//! A solver owns exactly one [`Engine`] session and the rule text for the
//! solver-core, game, and strategy roles. Construction and [`Solver::reload`]
//! consult the present roles in that fixed order; replacing a ruleset always
//! goes through a fresh consult, never an in-place edit. The solver also
//! exposes the game query facade used by the decision cycle.

pub mod engine;
mod queries;
pub mod session;
pub mod validate;

use anyhow::Result;
use tracing::{debug, instrument};

use self::engine::{Engine, EngineFactory, QueryResult};
use self::queries::{
    PLAYER_NAMES_GOAL, POSSIBLE_MOVES_GOAL, default_move_goal, payoff_goal, select_move_goal,
    update_default_move_goal, update_last_move_goal,
};
use self::validate::Validation;

/// Game-independent core ruleset shared by all agents.
pub const SOLVER_RULES: &str = include_str!("../../rules/solver.pl");

pub struct Solver {
    factory: EngineFactory,
    engine: Box<dyn Engine>,
    solver_rules: String,
    game_rules: Option<String>,
    strategy_rules: Option<String>,
    valid: bool,
    trace: Option<String>,
    released: bool,
}

impl Solver {
    /// Create a session and consult the solver-core ruleset into it.
    pub fn new(factory: EngineFactory) -> Result<Self> {
        Self::with_rules(factory, None, None)
    }

    /// Create a session holding the given game/strategy rules as well.
    #[instrument(skip_all)]
    pub fn with_rules(
        factory: EngineFactory,
        game_rules: Option<String>,
        strategy_rules: Option<String>,
    ) -> Result<Self> {
        let engine = (factory)()?;
        let mut solver = Self {
            factory,
            engine,
            solver_rules: SOLVER_RULES.to_string(),
            game_rules,
            strategy_rules,
            valid: false,
            trace: None,
            released: false,
        };
        solver.validate_all();
        Ok(solver)
    }

    /// Whether every present rule role validated on the last (re)load.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Trace from the last failed validation, if any.
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn factory(&self) -> EngineFactory {
        self.factory.clone()
    }

    pub fn set_game_rules(&mut self, rules: Option<String>) {
        self.game_rules = rules;
    }

    pub fn set_strategy_rules(&mut self, rules: Option<String>) {
        self.strategy_rules = rules;
    }

    /// Discard the engine session and start a fresh one, re-consulting every
    /// present rule role (solver-core, then game, then strategy).
    #[instrument(skip_all)]
    pub fn reload(&mut self) -> Result<()> {
        self.engine.stop();
        self.engine = (self.factory)()?;
        self.released = false;
        self.validate_all();
        Ok(())
    }

    /// Validate one candidate ruleset against the current session.
    pub fn validate(&mut self, code: &str) -> Validation {
        validate::validate(self.engine.as_mut(), code, &[])
    }

    /// Validate with required predicates that must exist after the consult.
    pub fn validate_with(&mut self, code: &str, required: &[&str]) -> Validation {
        validate::validate(self.engine.as_mut(), code, required)
    }

    /// Stop the engine session. Idempotent; never propagates teardown errors.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.engine.stop();
        self.released = true;
    }

    fn validate_all(&mut self) {
        let components = [
            ("solver", Some(self.solver_rules.clone())),
            ("game", self.game_rules.clone()),
            ("strategy", self.strategy_rules.clone()),
        ];
        let mut all_valid = true;
        for (role, code) in components {
            let Some(code) = code else { continue };
            let result = validate::validate(self.engine.as_mut(), &code, &[]);
            if !result.is_valid {
                debug!(role, trace = %result.trace, "ruleset failed validation");
                all_valid = false;
                self.trace = Some(result.trace);
            }
        }
        if all_valid {
            self.trace = None;
        }
        self.valid = all_valid;
    }

    // Game query facade. Each method builds a goal from a fixed template
    // after vetting its arguments; a rejected argument fails the query
    // without anything reaching the engine.

    pub fn possible_moves(&mut self) -> QueryResult {
        self.engine.query(POSSIBLE_MOVES_GOAL, None)
    }

    pub fn player_names(&mut self) -> QueryResult {
        self.engine.query(PLAYER_NAMES_GOAL, None)
    }

    pub fn default_move(&mut self, player: &str) -> QueryResult {
        match default_move_goal(player) {
            Ok(goal) => self.engine.query(&goal, Some(1)),
            Err(err) => QueryResult::fail(err.to_string()),
        }
    }

    /// Let the strategy rules choose a move for the named agent.
    pub fn select_move(&mut self, agent: &str) -> QueryResult {
        match select_move_goal(agent) {
            Ok(goal) => self.engine.query(&goal, Some(1)),
            Err(err) => QueryResult::fail(err.to_string()),
        }
    }

    /// Apply both moves hypothetically and read the player's payoff.
    pub fn calculate_payoff(
        &mut self,
        player: &str,
        opponent: &str,
        player_move: &str,
        opponent_move: &str,
    ) -> QueryResult {
        match payoff_goal(player, opponent, player_move, opponent_move) {
            Ok(goal) => self.engine.query(&goal, Some(1)),
            Err(err) => QueryResult::fail(err.to_string()),
        }
    }

    /// Assert the opponent's last move for the next round's strategy
    /// evaluation.
    pub fn update_opponent_last_move(&mut self, opponent: &str, mv: &str) -> QueryResult {
        match update_last_move_goal(opponent, mv) {
            Ok(goal) => self.engine.query(&goal, None),
            Err(err) => QueryResult::fail(err.to_string()),
        }
    }

    pub fn update_default_move(&mut self, mv: &str) -> QueryResult {
        match update_default_move_goal(mv) {
            Ok(goal) => self.engine.query(&goal, None),
            Err(err) => QueryResult::fail(err.to_string()),
        }
    }
}

impl Drop for Solver {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGameEngine, FakeStrategy, engine_factory};

    fn factory() -> EngineFactory {
        engine_factory(FakeGameEngine::prisoners_dilemma(FakeStrategy::Always(
            "defect".to_string(),
        )))
    }

    #[test]
    fn construction_validates_present_roles() {
        let solver = Solver::with_rules(
            factory(),
            Some("possible(move(_, defect), s0).".to_string()),
            None,
        )
        .expect("solver");
        assert!(solver.is_valid());
        assert!(solver.trace().is_none());
    }

    #[test]
    fn invalid_game_rules_record_a_trace() {
        let solver = Solver::with_rules(
            factory(),
            Some("broken :- syntax_error".to_string()),
            None,
        )
        .expect("solver");
        assert!(!solver.is_valid());
        assert!(solver.trace().is_some());
    }

    #[test]
    fn release_is_idempotent_and_queries_fail_afterwards() {
        let mut solver = Solver::new(factory()).expect("solver");
        solver.release();
        solver.release();
        assert!(solver.is_released());
        let result = solver.possible_moves();
        assert!(!result.success);
    }

    #[test]
    fn reload_replaces_the_session() {
        let mut solver = Solver::new(factory()).expect("solver");
        solver.release();
        solver.reload().expect("reload");
        assert!(!solver.is_released());
        assert!(solver.possible_moves().success);
    }

    #[test]
    fn rejected_argument_never_reaches_the_engine() {
        let mut solver = Solver::new(factory()).expect("solver");
        let result = solver.select_move("me, _, s0, M), true");
        assert!(!result.success);
        assert!(result.error.unwrap().contains("rejected goal argument"));
    }
}
