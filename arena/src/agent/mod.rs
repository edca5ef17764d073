//! Agents: the unit of domain state.
//!
//! An agent owns one [`Solver`] (and through it one engine session), the
//! game and strategy rulesets consulted into it, a [`Memory`] of past
//! rounds, and optionally an [`Autoformalizer`] for turning natural-language
//! descriptions into rules. Its lifecycle is a small state machine over
//! [`AgentStatus`]: every operation that can fail for domain reasons sets a
//! status instead of returning an error, so a tournament can keep going
//! after one agent breaks.

pub mod memory;
mod mind;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::autoformalize::Autoformalizer;
use crate::solver::Solver;
use crate::solver::engine::EngineFactory;

pub use self::memory::Memory;

/// Counter-strategy consulted into cloned adversaries: pick a legal move
/// that differs from the opponent's last observed move.
pub const ANTI_TIT_FOR_TAT_RULES: &str = include_str!("../../rules/anti_tit_for_tat.pl");

const UNNAMED_STRATEGY: &str = "unnamed_strategy";

/// Where an agent stands in its lifecycle. Only `Correct` agents play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Initializing,
    Correct,
    SyntacticError,
    MissingPredicates,
    #[serde(rename = "instruction_following_error")]
    InstructionError,
    RuntimeError,
}

impl AgentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Correct => "correct",
            AgentStatus::SyntacticError => "syntactic_error",
            AgentStatus::MissingPredicates => "missing_predicates",
            AgentStatus::InstructionError => "instruction_following_error",
            AgentStatus::RuntimeError => "runtime_error",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a ruleset is supplied.
pub enum RuleSource {
    /// Rule text, ready to consult.
    Text(String),
    /// A file to read the rule text from.
    Path(PathBuf),
    /// A natural-language description to formalize via the agent's
    /// language model, with an optional feedback-template override.
    Autoformalize {
        instruction: String,
        feedback: Option<String>,
    },
}

/// Derived view of the consulted game rules: who plays, with which moves,
/// and what the agent's opening move is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameDescriptor {
    /// Index 0 is the agent's own identity within its rules, index 1 the
    /// opponent.
    pub players: Vec<String>,
    pub moves: Vec<String>,
    pub default_move: Option<String>,
}

/// Serialized agent state; round-trips through [`Agent::save`]/[`Agent::load`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub name: String,
    pub strategy_name: String,
    pub strategy_rules: Option<String>,
    pub status: AgentStatus,
    pub game_rules: Option<String>,
    pub game_moves: Vec<String>,
    pub game_players: Vec<String>,
    pub default_move: Option<String>,
    pub moves: Vec<String>,
    pub opponent_moves: Vec<String>,
    pub payoffs: Vec<f64>,
    pub total_payoff: f64,
    pub trace_messages: Vec<String>,
    pub attempts: u32,
}

pub struct Agent {
    name: String,
    status: AgentStatus,
    strategy_name: String,
    pub(crate) game: GameDescriptor,
    game_rules: Option<String>,
    strategy_rules: Option<String>,
    pub(crate) memory: Memory,
    pub(crate) solver: Solver,
    autoformalizer: Option<Autoformalizer>,
    trace_messages: Vec<String>,
    attempts: u32,
}

impl Agent {
    /// Create an uninitialized agent with a fresh engine session and a
    /// random pronounceable name.
    pub fn new(factory: EngineFactory, autoformalizer: Option<Autoformalizer>) -> Result<Self> {
        Ok(Self {
            name: generate_agent_name(3),
            status: AgentStatus::Initializing,
            strategy_name: UNNAMED_STRATEGY.to_string(),
            game: GameDescriptor::default(),
            game_rules: None,
            strategy_rules: None,
            memory: Memory::default(),
            solver: Solver::new(factory)?,
            autoformalizer,
            trace_messages: Vec::new(),
            attempts: 0,
        })
    }

    /// Set game and strategy in one step on a freshly constructed agent.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub fn initialize(
        &mut self,
        game: RuleSource,
        strategy: RuleSource,
        name: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = name {
            self.name = name.to_string();
        }
        self.set_game_with(game, false)?;
        if self.status == AgentStatus::Correct {
            self.set_strategy_with(strategy, None, false)?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn game(&self) -> &GameDescriptor {
        &self.game
    }

    pub fn game_rules(&self) -> Option<&str> {
        self.game_rules.as_deref()
    }

    pub fn strategy_rules(&self) -> Option<&str> {
        self.strategy_rules.as_deref()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Replace the game rules. Re-evaluates status from scratch and, on
    /// success, re-derives the game descriptor.
    pub fn set_game(&mut self, source: RuleSource) -> Result<()> {
        self.set_game_with(source, true)
    }

    /// Replace the strategy rules. `name` overrides the strategy name;
    /// otherwise it is taken from the file stem for path sources.
    pub fn set_strategy(&mut self, source: RuleSource, name: Option<&str>) -> Result<()> {
        self.set_strategy_with(source, name, true)
    }

    #[instrument(skip_all, fields(agent = %self.name, reload))]
    fn set_game_with(&mut self, source: RuleSource, reload: bool) -> Result<()> {
        self.solver.set_game_rules(None);
        self.game = GameDescriptor::default();

        let Some(rules) = self.resolve_rules(source, "Formalize the game rules.")? else {
            // Autoformalization failed; its status is already set.
            return Ok(());
        };

        self.load_rules(&rules, Role::Game, reload);
        self.game_rules = Some(rules);
        if self.status != AgentStatus::Correct {
            return Ok(());
        }

        self.extract_descriptor();
        Ok(())
    }

    #[instrument(skip_all, fields(agent = %self.name, reload))]
    fn set_strategy_with(
        &mut self,
        source: RuleSource,
        name: Option<&str>,
        reload: bool,
    ) -> Result<()> {
        self.solver.set_strategy_rules(None);
        self.strategy_name = match (name, &source) {
            (Some(name), _) => name.to_string(),
            (None, RuleSource::Path(path)) => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| UNNAMED_STRATEGY.to_string()),
            (None, _) => UNNAMED_STRATEGY.to_string(),
        };

        let Some(rules) = self.resolve_rules(source, "Formalize the strategy.")? else {
            return Ok(());
        };

        self.load_rules(&rules, Role::Strategy, reload);
        self.strategy_rules = Some(rules);
        Ok(())
    }

    /// Resolve a rule source into text. Returns `None` when autoformalization
    /// ended without a valid ruleset; status is set either way.
    fn resolve_rules(
        &mut self,
        source: RuleSource,
        default_instruction: &str,
    ) -> Result<Option<String>> {
        match source {
            RuleSource::Text(text) => Ok(Some(text)),
            RuleSource::Path(path) => {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("read ruleset {}", path.display()))?;
                Ok(Some(text))
            }
            RuleSource::Autoformalize {
                instruction,
                feedback,
            } => {
                let formalizer = self
                    .autoformalizer
                    .as_mut()
                    .ok_or_else(|| anyhow!("agent {} has no language model", self.name))?;
                let instruction = if instruction.is_empty() {
                    default_instruction.to_string()
                } else {
                    instruction
                };
                formalizer.set_instruction_prompt(instruction);
                if let Some(feedback) = feedback {
                    formalizer.set_feedback_template(feedback);
                }
                let (rules, status) = formalizer.autoformalize(&mut self.solver, true)?;
                self.attempts = formalizer.attempts();
                self.trace_messages = formalizer.trace_messages().to_vec();
                self.status = status;
                if status == AgentStatus::Correct {
                    Ok(rules)
                } else {
                    debug!(agent = %self.name, %status, "autoformalization failed");
                    Ok(None)
                }
            }
        }
    }

    /// Consult resolved rule text into the session and set status from the
    /// outcome. `reload` restarts the session so state asserted by a
    /// previous ruleset cannot leak into the new one.
    fn load_rules(&mut self, rules: &str, role: Role, reload: bool) {
        let valid = if reload {
            match role {
                Role::Game => self.solver.set_game_rules(Some(rules.to_string())),
                Role::Strategy => self.solver.set_strategy_rules(Some(rules.to_string())),
            }
            match self.solver.reload() {
                Ok(()) => self.solver.is_valid(),
                Err(err) => {
                    warn!(agent = %self.name, err = %err, "engine reload failed");
                    false
                }
            }
        } else {
            let validation = self.solver.validate(rules);
            if validation.is_valid {
                match role {
                    Role::Game => self.solver.set_game_rules(Some(rules.to_string())),
                    Role::Strategy => self.solver.set_strategy_rules(Some(rules.to_string())),
                }
            } else {
                debug!(agent = %self.name, trace = %validation.trace, "ruleset rejected");
            }
            validation.is_valid
        };
        self.status = if valid {
            AgentStatus::Correct
        } else {
            AgentStatus::SyntacticError
        };
    }

    /// Query players, moves, and the default move out of freshly consulted
    /// game rules. Any gap demotes the agent to `MissingPredicates`.
    fn extract_descriptor(&mut self) {
        let moves = self.solver.possible_moves();
        if !moves.success || moves.values.is_empty() {
            self.status = AgentStatus::MissingPredicates;
            return;
        }
        let mut deduped: Vec<String> = Vec::new();
        for value in moves.values {
            if !deduped.contains(&value) {
                deduped.push(value);
            }
        }

        let players = self.solver.player_names();
        if !players.success || players.values.is_empty() {
            self.status = AgentStatus::MissingPredicates;
            return;
        }

        let own = players.values[0].clone();
        let default_move = self.solver.default_move(&own);
        let Some(default_move) = default_move.first().map(str::to_string) else {
            self.status = AgentStatus::MissingPredicates;
            return;
        };

        self.game = GameDescriptor {
            players: players.values,
            moves: deduped,
            default_move: Some(default_move),
        };
    }

    /// Change the default move, checking legality against the known moves.
    pub fn update_default_move(&mut self, mv: &str) -> Result<()> {
        if !self.game.moves.iter().any(|known| known == mv) {
            bail!("move {mv:?} is not a legal move of the current game");
        }
        let result = self.solver.update_default_move(mv);
        if !result.success {
            bail!(
                "failed to update default move: {}",
                result.error.unwrap_or_default()
            );
        }
        self.game.default_move = Some(mv.to_string());
        Ok(())
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            name: self.name.clone(),
            strategy_name: self.strategy_name.clone(),
            strategy_rules: self.strategy_rules.clone(),
            status: self.status,
            game_rules: self.game_rules.clone(),
            game_moves: self.game.moves.clone(),
            game_players: self.game.players.clone(),
            default_move: self.game.default_move.clone(),
            moves: self.memory.moves.clone(),
            opponent_moves: self.memory.opponent_moves.clone(),
            payoffs: self.memory.payoffs.clone(),
            total_payoff: self.total_payoff(),
            trace_messages: self.trace_messages.clone(),
            attempts: self.attempts,
        }
    }

    /// Serialize the agent into `dir` as `agent_<name>.json`.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(format!("agent_{}.json", self.name));
        let mut json = serde_json::to_string_pretty(&self.snapshot())
            .context("serialize agent snapshot")?;
        json.push('\n');
        fs::write(&path, json).with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }

    /// Rebuild an agent from a snapshot file. The snapshot's status is
    /// trusted; rules are re-consulted but not re-validated.
    pub fn load(
        path: &Path,
        factory: EngineFactory,
        autoformalizer: Option<Autoformalizer>,
    ) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("read snapshot {}", path.display()))?;
        let snapshot: AgentSnapshot =
            serde_json::from_str(&json).with_context(|| format!("parse snapshot {}", path.display()))?;
        Self::from_snapshot(snapshot, factory, autoformalizer)
    }

    #[instrument(skip_all, fields(agent = %snapshot.name))]
    pub fn from_snapshot(
        snapshot: AgentSnapshot,
        factory: EngineFactory,
        mut autoformalizer: Option<Autoformalizer>,
    ) -> Result<Self> {
        let solver = Solver::with_rules(
            factory,
            snapshot.game_rules.clone(),
            snapshot.strategy_rules.clone(),
        )?;
        if !solver.is_valid() {
            // Status is trusted over the fresh consult outcome.
            warn!(agent = %snapshot.name, "snapshot rules did not consult cleanly");
        }
        if let Some(formalizer) = autoformalizer.as_mut() {
            formalizer.restore(snapshot.attempts, snapshot.trace_messages.clone());
        }
        Ok(Self {
            name: snapshot.name,
            status: snapshot.status,
            strategy_name: snapshot.strategy_name,
            game: GameDescriptor {
                players: snapshot.game_players,
                moves: snapshot.game_moves,
                default_move: snapshot.default_move,
            },
            game_rules: snapshot.game_rules,
            strategy_rules: snapshot.strategy_rules,
            memory: Memory {
                moves: snapshot.moves,
                opponent_moves: snapshot.opponent_moves,
                payoffs: snapshot.payoffs,
            },
            solver,
            autoformalizer,
            trace_messages: snapshot.trace_messages,
            attempts: snapshot.attempts,
        })
    }

    /// Build an adversarial opponent: a fresh agent seeded from a snapshot,
    /// playing this agent's game with a fixed counter-strategy.
    #[instrument(skip_all, fields(agent = %self.name))]
    pub fn clone_agent(
        &self,
        snapshot_path: &Path,
        counter_strategy: Option<&str>,
    ) -> Result<Agent> {
        let game_rules = self
            .game_rules
            .clone()
            .ok_or_else(|| anyhow!("agent {} has no game rules to clone", self.name))?;
        let mut clone = Agent::load(snapshot_path, self.solver.factory(), None)?;
        clone.name = generate_agent_name(3);
        clone.memory = Memory::default();
        clone.set_game(RuleSource::Text(game_rules))?;
        if clone.status == AgentStatus::Correct {
            let strategy = counter_strategy.unwrap_or(ANTI_TIT_FOR_TAT_RULES);
            clone.set_strategy(
                RuleSource::Text(strategy.to_string()),
                Some("anti_tit_for_tat"),
            )?;
        }
        Ok(clone)
    }

    /// Stop the engine session. Idempotent.
    pub fn release(&mut self) {
        self.solver.release();
    }

    pub fn is_released(&self) -> bool {
        self.solver.is_released()
    }
}

enum Role {
    Game,
    Strategy,
}

/// Random pronounceable name: alternating consonant/vowel pairs,
/// capitalized.
pub fn generate_agent_name(syllables: usize) -> String {
    const CONSONANTS: &[u8] = b"bcdfghjklmnpqrstvwz";
    const VOWELS: &[u8] = b"aeiou";
    let mut rng = rand::thread_rng();
    let mut name = String::with_capacity(syllables * 2);
    for index in 0..syllables {
        let consonant = CONSONANTS[rng.gen_range(0..CONSONANTS.len())] as char;
        let vowel = VOWELS[rng.gen_range(0..VOWELS.len())] as char;
        if index == 0 {
            name.push(consonant.to_ascii_uppercase());
        } else {
            name.push(consonant);
        }
        name.push(vowel);
    }
    name
}
