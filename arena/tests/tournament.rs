//! End-to-end scenarios over the public API, using the scripted fakes.

use arena::agent::{Agent, AgentSnapshot, AgentStatus, RuleSource};
use arena::autoformalize::Autoformalizer;
use arena::pool::AgentPool;
use arena::solver::engine::EngineFactory;
use arena::test_support::{
    ALWAYS_DEFECT_RULES, FakeGameEngine, FakeStrategy, PD_GAME_RULES, ScriptedModel,
    engine_factory,
};
use arena::tournament::{Tournament, round_robin};

fn defect_factory() -> EngineFactory {
    engine_factory(FakeGameEngine::prisoners_dilemma(FakeStrategy::Always(
        "defect".to_string(),
    )))
}

fn defect_agent(name: &str) -> Agent {
    let mut agent = Agent::new(defect_factory(), None).expect("agent");
    agent
        .initialize(
            RuleSource::Text(PD_GAME_RULES.to_string()),
            RuleSource::Text(ALWAYS_DEFECT_RULES.to_string()),
            Some(name),
        )
        .expect("initialize");
    agent
}

#[test]
fn mutual_defection_over_four_rounds_ties_both_agents() {
    let mut pool = AgentPool::new();
    pool.add(defect_agent("Kato"));
    pool.add(defect_agent("Fibu"));

    let mut tournament = Tournament::new(pool, 4);
    tournament.play(&round_robin).expect("play");

    for agent in tournament.pool().valid() {
        assert_eq!(agent.total_payoff(), 4.0);
        assert_eq!(agent.memory().moves.len(), 4);
        assert_eq!(agent.memory().opponent_moves.len(), 4);
        assert_eq!(agent.memory().payoffs.len(), 4);
    }
    assert_eq!(tournament.get_winners().len(), 2);
}

#[test]
fn snapshot_round_trip_preserves_agent_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut agent = defect_agent("Kato");
    agent.act().expect("move");
    agent.observe("cooperate");
    agent.think();

    let path = agent.save(dir.path()).expect("save");
    let loaded = Agent::load(&path, defect_factory(), None).expect("load");

    assert_eq!(loaded.status(), agent.status());
    assert_eq!(loaded.game_rules(), agent.game_rules());
    assert_eq!(loaded.strategy_rules(), agent.strategy_rules());
    assert_eq!(loaded.game(), agent.game());
    assert_eq!(loaded.memory(), agent.memory());
    assert_eq!(loaded.total_payoff(), agent.total_payoff());
}

#[test]
fn identical_snapshots_with_a_deterministic_strategy_tie() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = defect_agent("Kato").save(dir.path()).expect("save");
    let json = std::fs::read_to_string(&path).expect("read snapshot");

    let first: AgentSnapshot = serde_json::from_str(&json).expect("parse");
    let mut second: AgentSnapshot = serde_json::from_str(&json).expect("parse");
    second.name = "Fibu".to_string();

    let mut pool = AgentPool::new();
    pool.add(Agent::from_snapshot(first, defect_factory(), None).expect("first"));
    pool.add(Agent::from_snapshot(second, defect_factory(), None).expect("second"));

    let mut tournament = Tournament::new(pool, 3);
    tournament.play(&round_robin).expect("play");

    let winners = tournament.get_winners();
    assert_eq!(winners.len(), 2);
    assert_eq!(winners[0].total_payoff(), winners[1].total_payoff());
}

#[test]
fn truncated_agents_are_released_and_fail_fast() {
    let mut pool = AgentPool::new();
    pool.add(defect_agent("Kato"));
    pool.add(defect_agent("Fibu"));
    pool.add(defect_agent("Ruma"));

    pool.truncate(1);
    assert_eq!(pool.valid().len(), 1);

    let mut survivor = pool.take("Kato").expect("survivor");
    assert!(survivor.act().is_some());
}

#[test]
fn a_failing_pair_does_not_abort_the_tournament() {
    let mut broken = Agent::new(
        engine_factory(FakeGameEngine::prisoners_dilemma(FakeStrategy::Fail)),
        None,
    )
    .expect("agent");
    broken
        .initialize(
            RuleSource::Text(PD_GAME_RULES.to_string()),
            RuleSource::Text(ALWAYS_DEFECT_RULES.to_string()),
            Some("Wobo"),
        )
        .expect("initialize");

    let mut pool = AgentPool::new();
    pool.add(defect_agent("Kato"));
    pool.add(defect_agent("Fibu"));
    pool.add(broken);

    let mut tournament = Tournament::new(pool, 4);
    tournament.play(&round_robin).expect("play");

    // Kato and Fibu complete their own pair before either meets Wobo.
    let kato = tournament
        .pool()
        .invalid()
        .iter()
        .chain(tournament.pool().valid())
        .find(|agent| agent.name() == "Kato")
        .expect("Kato");
    assert_eq!(kato.memory().payoffs.len(), 4);
}

#[test]
fn tournament_log_contains_a_summary_and_every_snapshot() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut pool = AgentPool::new();
    pool.add(defect_agent("Kato"));
    pool.add(defect_agent("Fibu"));

    let mut tournament = Tournament::new(pool, 2);
    tournament.play(&round_robin).expect("play");
    let run_dir = tournament
        .log_tournament(dir.path(), "pd")
        .expect("log_tournament");

    let summary = std::fs::read_to_string(run_dir.join("tournament_info.json"))
        .expect("read summary");
    let summary: serde_json::Value = serde_json::from_str(&summary).expect("parse summary");
    assert_eq!(summary["num_agents"], 2);
    assert_eq!(summary["num_rounds"], 2);
    let winners = summary["winners_payoffs"].as_array().expect("winners");
    assert_eq!(winners.len(), 2);
    for winner in winners {
        let entry = winner.as_array().expect("tuple");
        assert_eq!(entry.len(), 3);
        assert!(entry[0].is_string());
        assert!(entry[1].is_string());
        assert_eq!(entry[2], 2.0);
    }

    assert!(run_dir.join("agent_Kato.json").exists());
    assert!(run_dir.join("agent_Fibu.json").exists());
}

#[test]
fn autoformalized_strategy_reaches_correct_via_repair() {
    let model = ScriptedModel::new(vec![
        "here you go\n@\nbroken :- syntax_error\n@",
        "@\nselect(P, _, s0, defect) :- holds(player(P), s0).\n@",
    ]);
    let formalizer = Autoformalizer::new(Box::new(model.clone()), 3);

    let mut agent = Agent::new(defect_factory(), Some(formalizer)).expect("agent");
    agent
        .set_game(RuleSource::Text(PD_GAME_RULES.to_string()))
        .expect("set_game");
    agent
        .set_strategy(
            RuleSource::Autoformalize {
                instruction: "Always defect.".to_string(),
                feedback: None,
            },
            Some("always_defect"),
        )
        .expect("set_strategy");

    assert_eq!(agent.status(), AgentStatus::Correct);
    assert!(agent.strategy_rules().expect("rules").contains("select"));
    assert_eq!(model.prompts().len(), 2);
    assert!(agent.act().is_some());
}

#[test]
fn undelimited_responses_exhaust_attempts_as_instruction_error() {
    let model = ScriptedModel::new(vec!["no code fences here"]);
    let formalizer = Autoformalizer::new(Box::new(model.clone()), 1);

    let mut agent = Agent::new(defect_factory(), Some(formalizer)).expect("agent");
    agent
        .set_game(RuleSource::Text(PD_GAME_RULES.to_string()))
        .expect("set_game");
    agent
        .set_strategy(
            RuleSource::Autoformalize {
                instruction: "Always defect.".to_string(),
                feedback: None,
            },
            None,
        )
        .expect("set_strategy");

    assert_eq!(agent.status(), AgentStatus::InstructionError);
    assert_eq!(model.prompts().len(), 1);
    assert!(agent.strategy_rules().is_none());
}
