//! Agents that play repeated two-player games by reasoning over formal
//! logic programs.
//!
//! Each [`agent::Agent`] owns a private session against an external rule
//! engine ([`solver`]), into which three rulesets are consulted: a shared
//! solver core, the game mechanics, and a strategy. Rulesets are supplied
//! directly or synthesized from natural language by a bounded
//! generate/validate/repair loop over a language model
//! ([`autoformalize`]). A [`tournament::Tournament`] pairs agents from an
//! [`pool::AgentPool`] and plays them round by round, logging every
//! agent's final state to a timestamped run directory.

pub mod agent;
pub mod autoformalize;
pub mod config;
pub mod llm;
pub mod logging;
pub mod pool;
pub mod solver;
pub mod tournament;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
