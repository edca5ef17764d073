//! Tests against a real SWI-Prolog installation.
//!
//! Ignored by default; run with `cargo test -- --ignored` on a machine with
//! `swipl` on the PATH.

use arena::agent::{Agent, AgentStatus, RuleSource};
use arena::config::EngineConfig;
use arena::solver::Solver;
use arena::solver::session::SwiplSession;

const PD_GAME_RULES: &str = include_str!("../rules/prisoners_dilemma.pl");
const TIT_FOR_TAT_RULES: &str = include_str!("../rules/tit_for_tat.pl");

#[test]
#[ignore = "requires swipl on the PATH"]
fn session_answers_game_queries() {
    let factory = SwiplSession::factory(EngineConfig::default());
    let mut solver = Solver::with_rules(factory, Some(PD_GAME_RULES.to_string()), None)
        .expect("solver");
    assert!(solver.is_valid());

    let moves = solver.possible_moves();
    assert!(moves.success);
    assert!(moves.values.contains(&"cooperate".to_string()));
    assert!(moves.values.contains(&"defect".to_string()));

    let players = solver.player_names();
    assert!(players.success);
    assert_eq!(players.values, vec!["me", "opponent"]);

    let payoff = solver.calculate_payoff("me", "opponent", "defect", "cooperate");
    assert_eq!(payoff.first(), Some("5"));
}

#[test]
#[ignore = "requires swipl on the PATH"]
fn broken_rules_fail_validation_with_a_trace() {
    let factory = SwiplSession::factory(EngineConfig::default());
    let mut solver = Solver::new(factory).expect("solver");
    let validation = solver.validate("broken(X :- true.");
    assert!(!validation.is_valid);
    assert!(!validation.trace.is_empty());
}

#[test]
#[ignore = "requires swipl on the PATH"]
fn tit_for_tat_agent_plays_a_full_round() {
    let factory = SwiplSession::factory(EngineConfig::default());
    let mut agent = Agent::new(factory, None).expect("agent");
    agent
        .initialize(
            RuleSource::Text(PD_GAME_RULES.to_string()),
            RuleSource::Text(TIT_FOR_TAT_RULES.to_string()),
            None,
        )
        .expect("initialize");
    assert_eq!(agent.status(), AgentStatus::Correct);

    // First round falls back to the default move.
    assert_eq!(agent.act().as_deref(), Some("defect"));
    assert!(agent.observe("cooperate"));
    assert!(agent.think());
    assert_eq!(agent.total_payoff(), 5.0);

    // Second round mirrors the observed move.
    assert_eq!(agent.act().as_deref(), Some("cooperate"));
}
