//! TOML configuration for the engine, autoformalization, and tournaments.
//!
//! Every field has a default, so a missing file or an empty table yields a
//! usable configuration. Writes are atomic: the file is written to a
//! temporary sibling and renamed into place.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ArenaConfig {
    pub engine: EngineConfig,
    pub autoformalization: AutoformalizationConfig,
    pub tournament: TournamentConfig,
}

/// How to start and talk to the external rule engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine executable and leading arguments.
    pub command: Vec<String>,
    pub query_timeout_secs: u64,
    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Cap on buffered engine stderr per session.
    pub diagnostics_limit_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: vec!["swipl".to_string()],
            query_timeout_secs: 30,
            startup_timeout_secs: 10,
            shutdown_timeout_secs: 5,
            diagnostics_limit_bytes: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoformalizationConfig {
    pub max_attempts: u32,
}

impl Default for AutoformalizationConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub num_rounds: u32,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self { num_rounds: 10 }
    }
}

impl ArenaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.engine.command.is_empty() {
            bail!("engine.command must name an executable");
        }
        if self.engine.query_timeout_secs == 0 {
            bail!("engine.query_timeout_secs must be positive");
        }
        if self.autoformalization.max_attempts == 0 {
            bail!("autoformalization.max_attempts must be positive");
        }
        if self.tournament.num_rounds == 0 {
            bail!("tournament.num_rounds must be positive");
        }
        Ok(())
    }
}

/// Load the configuration, falling back to defaults if the file is absent.
pub fn load_config(path: &Path) -> Result<ArenaConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file absent, using defaults");
        return Ok(ArenaConfig::default());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: ArenaConfig = toml::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Write the configuration atomically (temporary sibling + rename).
pub fn write_config(path: &Path, config: &ArenaConfig) -> Result<()> {
    config.validate()?;
    let text = toml::to_string_pretty(config).context("serialize config")?;
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, text).with_context(|| format!("write config {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
