//! Agent pool: valid and invalid agents, partitioned by status.
//!
//! The pool owns its agents. A tournament takes both members of a pair out
//! of the pool, plays the match, and puts them back; `add` routes each
//! returning agent by its current status, so a match failure automatically
//! demotes both sides.

use std::fmt;

use tracing::{debug, instrument};

use crate::agent::{Agent, AgentStatus};

#[derive(Default)]
pub struct AgentPool {
    valid: Vec<Agent>,
    invalid: Vec<Agent>,
}

impl AgentPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route an agent to `valid` or `invalid` by its current status.
    pub fn add(&mut self, agent: Agent) {
        debug!(agent = %agent.name(), status = %agent.status(), "adding agent");
        if agent.status() == AgentStatus::Correct {
            self.valid.push(agent);
        } else {
            self.invalid.push(agent);
        }
    }

    pub fn valid(&self) -> &[Agent] {
        &self.valid
    }

    pub fn invalid(&self) -> &[Agent] {
        &self.invalid
    }

    pub fn len(&self) -> usize {
        self.valid.len() + self.invalid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty() && self.invalid.is_empty()
    }

    /// Take the named agent out of the pool, if present.
    pub fn take(&mut self, name: &str) -> Option<Agent> {
        if let Some(index) = self.valid.iter().position(|agent| agent.name() == name) {
            return Some(self.valid.remove(index));
        }
        if let Some(index) = self.invalid.iter().position(|agent| agent.name() == name) {
            return Some(self.invalid.remove(index));
        }
        None
    }

    /// Relocate an agent whose list membership no longer matches its
    /// status. Returns whether the agent was found.
    pub fn move_agent(&mut self, name: &str) -> bool {
        let Some(agent) = self.take(name) else {
            return false;
        };
        self.add(agent);
        true
    }

    /// Drop all but the first `n` entries from each list, releasing each
    /// dropped agent's engine session.
    #[instrument(skip_all, fields(n))]
    pub fn truncate(&mut self, n: usize) {
        for list in [&mut self.valid, &mut self.invalid] {
            while list.len() > n {
                if let Some(mut agent) = list.pop() {
                    debug!(agent = %agent.name(), "releasing truncated agent");
                    agent.release();
                }
            }
        }
    }

    /// Release every agent's engine session and clear both lists. The pool
    /// is single-use after cleanup.
    #[instrument(skip_all)]
    pub fn clean_all(&mut self) {
        for agent in self.valid.iter_mut().chain(self.invalid.iter_mut()) {
            agent.release();
        }
        self.valid.clear();
        self.invalid.clear();
    }
}

impl fmt::Display for AgentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |agents: &[Agent]| {
            agents
                .iter()
                .map(|agent| agent.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "valid: [{}], invalid: [{}]",
            names(&self.valid),
            names(&self.invalid)
        )
    }
}
