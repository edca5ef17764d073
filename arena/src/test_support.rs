//! Scripted fakes for tests: an in-memory engine speaking the goal-template
//! contract and a language model replaying canned responses.
//!
//! Compiled for this crate's own tests and for downstream tests via the
//! `test-support` feature.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Result, anyhow};
use regex::Regex;

use crate::llm::LanguageModel;
use crate::solver::engine::{Engine, EngineFactory, QueryResult};

/// Bundled prisoner's-dilemma game rules.
pub const PD_GAME_RULES: &str = include_str!("../rules/prisoners_dilemma.pl");
/// Bundled always-defect strategy.
pub const ALWAYS_DEFECT_RULES: &str = include_str!("../rules/always_defect.pl");
/// Bundled tit-for-tat strategy.
pub const TIT_FOR_TAT_RULES: &str = include_str!("../rules/tit_for_tat.pl");

/// How the fake engine answers move-selection goals.
#[derive(Debug, Clone, Default)]
pub enum FakeStrategy {
    /// Always pick this move.
    Always(String),
    /// Repeat the last asserted opponent move, default move first.
    TitForTat,
    /// Every selection fails.
    #[default]
    Fail,
}

/// In-memory engine implementing the goal-template contract for one
/// two-player game, without spawning a process.
///
/// Consults are simulated: content containing `syntax_error` fails, lines
/// starting with `% warn:` feed the diagnostic buffer, and clause heads are
/// scanned into `defined_predicates` for `current_predicate` probes.
#[derive(Debug, Clone)]
pub struct FakeGameEngine {
    pub players: Vec<String>,
    pub moves: Vec<String>,
    pub default_move: String,
    /// Payoff for (own move, opponent move).
    pub payoffs: HashMap<(String, String), f64>,
    pub strategy: FakeStrategy,
    pub defined_predicates: BTreeSet<String>,
    pub last_moves: HashMap<String, String>,
    pub diagnostics: String,
    pub stopped: bool,
    /// Contents of every successfully consulted file, in order.
    pub consulted: Vec<String>,
}

impl FakeGameEngine {
    /// The standard two-player prisoner's dilemma.
    pub fn prisoners_dilemma(strategy: FakeStrategy) -> Self {
        let mut payoffs = HashMap::new();
        for (own, opponent, payoff) in [
            ("cooperate", "cooperate", 3.0),
            ("cooperate", "defect", 0.0),
            ("defect", "cooperate", 5.0),
            ("defect", "defect", 1.0),
        ] {
            payoffs.insert((own.to_string(), opponent.to_string()), payoff);
        }
        Self {
            players: vec!["me".to_string(), "opponent".to_string()],
            moves: vec!["cooperate".to_string(), "defect".to_string()],
            default_move: "defect".to_string(),
            payoffs,
            strategy,
            defined_predicates: BTreeSet::new(),
            last_moves: HashMap::new(),
            diagnostics: String::new(),
            stopped: false,
            consulted: Vec::new(),
        }
    }

    fn select(&self) -> Option<String> {
        match &self.strategy {
            FakeStrategy::Always(mv) => Some(mv.clone()),
            FakeStrategy::TitForTat => Some(
                self.last_moves
                    .values()
                    .next()
                    .cloned()
                    .unwrap_or_else(|| self.default_move.clone()),
            ),
            FakeStrategy::Fail => None,
        }
    }
}

fn goal_patterns() -> &'static GoalPatterns {
    static PATTERNS: OnceLock<GoalPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| GoalPatterns {
        default_move: Regex::new(r"^initially\(default_move\(([a-z]\w*), X\), s0\)\.$")
            .expect("default_move pattern"),
        select: Regex::new(r"^select\(([a-z]\w*), _, s0, M\)\.$").expect("select pattern"),
        payoff: Regex::new(
            r"^finally\(goal\(([a-z]\w*), U\), do\(move\([a-z]\w*,'([^']+)'\), do\(move\([a-z]\w*,'([^']+)'\), s0\)\)\)\.$",
        )
        .expect("payoff pattern"),
        last_move: Regex::new(r"^initialise\(last_move\(([a-z]\w*),'([^']+)'\), s0\)\.$")
            .expect("last_move pattern"),
        set_default: Regex::new(r"^initialise\(default_move\(_,'([^']+)'\), s0\)\.$")
            .expect("set_default pattern"),
        predicate: Regex::new(r"^current_predicate\((\w+(?:/\d+)?)\)\.$")
            .expect("predicate pattern"),
    })
}

struct GoalPatterns {
    default_move: Regex,
    select: Regex,
    payoff: Regex,
    last_move: Regex,
    set_default: Regex,
    predicate: Regex,
}

impl Engine for FakeGameEngine {
    fn consult(&mut self, path: &Path) -> QueryResult {
        if self.stopped {
            return QueryResult::fail("engine session is stopped");
        }
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => return QueryResult::fail(format!("consult: {err}")),
        };
        for line in content.lines() {
            if line.contains("syntax_error") {
                return QueryResult::fail(format!("syntax error: {}", line.trim()));
            }
            if let Some(warning) = line.strip_prefix("% warn:") {
                self.diagnostics.push_str(warning.trim());
                self.diagnostics.push('\n');
                continue;
            }
            // Clause-head scan for current_predicate probes.
            let head: String = line
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if head
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_lowercase())
            {
                self.defined_predicates.insert(head);
            }
        }
        self.consulted.push(content);
        QueryResult::ok(Vec::new())
    }

    fn query(&mut self, goal: &str, limit: Option<usize>) -> QueryResult {
        if self.stopped {
            return QueryResult::fail("engine session is stopped");
        }
        let patterns = goal_patterns();
        let mut result = match goal {
            "true." => QueryResult::ok(Vec::new()),
            "possible(move(_,X), s0)." => {
                if self.moves.is_empty() {
                    QueryResult::fail("no solutions for goal")
                } else {
                    QueryResult::ok(self.moves.clone())
                }
            }
            "holds(player(N), s0)." => {
                if self.players.is_empty() {
                    QueryResult::fail("no solutions for goal")
                } else {
                    QueryResult::ok(self.players.clone())
                }
            }
            _ => {
                if patterns.default_move.is_match(goal) {
                    QueryResult::ok(vec![self.default_move.clone()])
                } else if patterns.select.is_match(goal) {
                    match self.select() {
                        Some(mv) => QueryResult::ok(vec![mv]),
                        None => QueryResult::fail("selection failed"),
                    }
                } else if let Some(captures) = patterns.payoff.captures(goal) {
                    let key = (captures[2].to_string(), captures[3].to_string());
                    match self.payoffs.get(&key) {
                        Some(payoff) => QueryResult::ok(vec![payoff.to_string()]),
                        None => QueryResult::fail(format!(
                            "no payoff for moves {:?}/{:?}",
                            key.0, key.1
                        )),
                    }
                } else if let Some(captures) = patterns.last_move.captures(goal) {
                    self.last_moves
                        .insert(captures[1].to_string(), captures[2].to_string());
                    QueryResult::ok(Vec::new())
                } else if let Some(captures) = patterns.set_default.captures(goal) {
                    self.default_move = captures[1].to_string();
                    QueryResult::ok(Vec::new())
                } else if let Some(captures) = patterns.predicate.captures(goal) {
                    let name = &captures[1];
                    let functor = name.split('/').next().unwrap_or(name);
                    if self.defined_predicates.contains(name)
                        || self.defined_predicates.contains(functor)
                    {
                        QueryResult::ok(Vec::new())
                    } else {
                        QueryResult::fail(format!("unknown predicate {name}"))
                    }
                } else {
                    QueryResult::fail(format!("unrecognized goal: {goal}"))
                }
            }
        };
        if let Some(limit) = limit {
            result.values.truncate(limit);
        }
        result
    }

    fn stop(&mut self) {
        self.stopped = true;
    }

    fn drain_diagnostics(&mut self) -> String {
        std::mem::take(&mut self.diagnostics)
    }
}

/// Factory handing out fresh clones of a configured fake engine.
pub fn engine_factory(engine: FakeGameEngine) -> EngineFactory {
    Arc::new(move || Ok(Box::new(engine.clone()) as Box<dyn Engine>))
}

#[derive(Default)]
struct ScriptedModelState {
    prompts: Vec<String>,
    responses: VecDeque<String>,
    clears: usize,
}

/// Language model replaying canned responses; clones share state so tests
/// can inspect the prompts it received.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    state: Arc<Mutex<ScriptedModelState>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedModelState {
                prompts: Vec::new(),
                responses: responses.into_iter().map(str::to_string).collect(),
                clears: 0,
            })),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.prompts.clone())
            .unwrap_or_default()
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().map(|state| state.clears).unwrap_or(0)
    }
}

impl LanguageModel for ScriptedModel {
    fn prompt(&mut self, text: &str) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("scripted model state poisoned"))?;
        state.prompts.push(text.to_string());
        state
            .responses
            .pop_front()
            .ok_or_else(|| anyhow!("scripted model ran out of responses"))
    }

    fn clear_context(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.clears += 1;
        }
    }
}
