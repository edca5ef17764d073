//! Tournament orchestration: repeated matches over a pool of agents.
//!
//! A pairing function chooses which valid agents meet; each pair plays
//! `num_rounds` rounds of the decision cycle. Within a round the two `act`
//! calls run concurrently (each agent owns a private engine session);
//! `observe` and `think` wait for both moves. One pair's failure demotes
//! both of its agents and the tournament continues with the other pairs.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::agent::{Agent, AgentStatus};
use crate::config::TournamentConfig;
use crate::pool::AgentPool;

/// Pairing function: indices into the pool's valid list at pairing time.
pub type MatchMaker = dyn Fn(&[Agent]) -> Vec<(usize, usize)>;

/// Every unordered pair of valid agents.
pub fn round_robin(agents: &[Agent]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..agents.len() {
        for j in (i + 1)..agents.len() {
            pairs.push((i, j));
        }
    }
    pairs
}

pub struct Tournament {
    pool: AgentPool,
    num_rounds: u32,
    target_payoffs: Vec<f64>,
    /// Valid-agent names in pool order, captured when pairing starts; the
    /// target-payoff vector aligns to this positionally.
    baseline: Vec<String>,
}

impl Tournament {
    pub fn new(pool: AgentPool, num_rounds: u32) -> Self {
        Self {
            pool,
            num_rounds,
            target_payoffs: Vec::new(),
            baseline: Vec::new(),
        }
    }

    pub fn from_config(pool: AgentPool, config: &TournamentConfig) -> Self {
        Self::new(pool, config.num_rounds)
    }

    /// Winners become the agents matching these payoffs positionally,
    /// instead of the agents tied at the maximum.
    pub fn with_target_payoffs(mut self, targets: Vec<f64>) -> Self {
        self.target_payoffs = targets;
        self
    }

    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut AgentPool {
        &mut self.pool
    }

    pub fn into_pool(self) -> AgentPool {
        self.pool
    }

    /// Run every pairing the match maker produces.
    #[instrument(skip_all, fields(num_rounds = self.num_rounds))]
    pub fn play(&mut self, match_maker: &MatchMaker) -> Result<()> {
        if self.pool.is_empty() {
            bail!("tournament pool is empty");
        }
        self.baseline = self
            .pool
            .valid()
            .iter()
            .map(|agent| agent.name().to_string())
            .collect();

        let valid = self.pool.valid();
        let pairs: Vec<(String, String)> = match_maker(valid)
            .into_iter()
            .filter_map(|(i, j)| match (valid.get(i), valid.get(j)) {
                (Some(a), Some(b)) if i != j => {
                    Some((a.name().to_string(), b.name().to_string()))
                }
                _ => {
                    warn!(i, j, "dropping malformed pairing");
                    None
                }
            })
            .collect();
        debug!(pairs = pairs.len(), "pairings fixed");

        for (first, second) in pairs {
            let Some(mut a) = self.pool.take(&first) else {
                warn!(agent = %first, "paired agent left the pool, skipping pair");
                continue;
            };
            let Some(mut b) = self.pool.take(&second) else {
                warn!(agent = %second, "paired agent left the pool, skipping pair");
                self.pool.add(a);
                continue;
            };

            if !self.play_match(&mut a, &mut b) {
                warn!(first = %a.name(), second = %b.name(), "match failed, demoting pair");
                a.set_status(AgentStatus::RuntimeError);
                b.set_status(AgentStatus::RuntimeError);
            }
            self.pool.add(a);
            self.pool.add(b);
        }
        Ok(())
    }

    /// Play all rounds for one pair. Returns false as soon as any step of
    /// either agent's cycle fails; remaining rounds are skipped.
    fn play_match(&self, a: &mut Agent, b: &mut Agent) -> bool {
        for round in 0..self.num_rounds {
            // The two selections only touch their own sessions.
            let (a_move, b_move) = thread::scope(|scope| {
                let handle = scope.spawn(|| a.act());
                let b_move = b.act();
                (handle.join().unwrap_or(None), b_move)
            });
            let (Some(a_move), Some(b_move)) = (a_move, b_move) else {
                warn!(round, "move selection failed");
                return false;
            };

            if !a.observe(&b_move) || !b.observe(&a_move) {
                return false;
            }
            let a_done = a.think();
            let b_done = b.think();
            if !(a_done && b_done) {
                warn!(round, "round bookkeeping failed");
                return false;
            }
        }
        true
    }

    /// Agents matching their target payoff, or all agents tied at the
    /// maximum payoff when no targets were supplied.
    pub fn get_winners(&self) -> Vec<&Agent> {
        let valid = self.pool.valid();
        if !self.target_payoffs.is_empty() {
            return valid
                .iter()
                .filter(|agent| {
                    self.baseline
                        .iter()
                        .position(|name| name == agent.name())
                        .and_then(|index| self.target_payoffs.get(index))
                        .is_some_and(|target| agent.total_payoff() == *target)
                })
                .collect();
        }

        let max = valid
            .iter()
            .map(Agent::total_payoff)
            .fold(f64::NEG_INFINITY, f64::max);
        valid
            .iter()
            .filter(|agent| agent.total_payoff() == max)
            .collect()
    }

    /// Write a timestamped run directory: a summary record plus one
    /// snapshot per agent, valid and invalid alike.
    #[instrument(skip_all, fields(name))]
    pub fn log_tournament(&self, experiment_dir: &Path, name: &str) -> Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let run_dir = experiment_dir.join(format!("{name}_{timestamp}"));
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("create run directory {}", run_dir.display()))?;

        // One (name, strategy, payoff) tuple per winner.
        let winners: Vec<_> = self
            .get_winners()
            .into_iter()
            .map(|agent| {
                serde_json::json!([agent.name(), agent.strategy_name(), agent.total_payoff()])
            })
            .collect();
        let info = serde_json::json!({
            "num_agents": self.pool.len(),
            "num_rounds": self.num_rounds,
            "target_payoffs": self.target_payoffs,
            "winners_payoffs": winners,
        });
        let mut json =
            serde_json::to_string_pretty(&info).context("serialize tournament summary")?;
        json.push('\n');
        fs::write(run_dir.join("tournament_info.json"), json)
            .context("write tournament summary")?;

        for agent in self.pool.valid().iter().chain(self.pool.invalid()) {
            if let Err(err) = agent.save(&run_dir) {
                warn!(agent = %agent.name(), err = %err, "failed to save agent snapshot");
            }
        }
        Ok(run_dir)
    }
}
