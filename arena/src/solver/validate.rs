//! Ruleset validation against a live engine session.
//!
//! Validation persists candidate code to a scoped temporary file, consults
//! it, checks required predicates, and finally inspects the diagnostic
//! output the engine emitted while consulting (warnings that do not fail the
//! consult but indicate unsafe rules). The diagnostic capture is scoped per
//! call: the buffer is drained before the consult and collected after, so
//! validations sharing an engine do not see each other's output.

use std::io::Write;

use tracing::{debug, instrument};

use crate::solver::engine::Engine;
use crate::solver::queries::current_predicate_goal;

/// Outcome of a validation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub is_valid: bool,
    pub trace: String,
}

impl Validation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            trace: String::new(),
        }
    }

    fn invalid(trace: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            trace: trace.into(),
        }
    }
}

/// Decide whether a candidate ruleset is acceptable before it is trusted.
#[instrument(skip_all, fields(code_bytes = code.len(), required = required.len()))]
pub fn validate(engine: &mut dyn Engine, code: &str, required: &[&str]) -> Validation {
    // Scope the diagnostic capture to this call.
    engine.drain_diagnostics();

    // The temp file is removed on every exit path when it drops.
    let mut file = match tempfile::Builder::new()
        .prefix("ruleset-")
        .suffix(".pl")
        .tempfile()
    {
        Ok(file) => file,
        Err(err) => return Validation::invalid(format!("create ruleset file: {err}")),
    };
    if let Err(err) = file
        .write_all(code.as_bytes())
        .and_then(|()| file.flush())
    {
        return Validation::invalid(format!("write ruleset file: {err}"));
    }

    let consult = engine.consult(file.path());
    if !consult.success {
        let trace = consult
            .error
            .unwrap_or_else(|| "engine rejected the ruleset".to_string());
        debug!(trace, "consult failed");
        return Validation::invalid(trace);
    }

    for predicate in required {
        let goal = match current_predicate_goal(predicate) {
            Ok(goal) => goal,
            Err(err) => return Validation::invalid(err.to_string()),
        };
        let result = engine.query(&goal, None);
        if !result.success {
            debug!(predicate, "missing predicate");
            return Validation::invalid(format!("Missing predicate: {predicate}"));
        }
    }

    let diagnostics = engine.drain_diagnostics();
    let diagnostics = diagnostics.trim();
    if !diagnostics.is_empty() {
        debug!(diagnostics, "engine reported diagnostics during consult");
        return Validation::invalid(diagnostics.to_string());
    }

    Validation::ok()
}
