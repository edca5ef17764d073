//! Bounded generate → validate → repair loop over a language model.
//!
//! Each attempt prompts the model, extracts the ruleset between `@`
//! delimiters, and validates it against the agent's solver. A response
//! without delimiters costs an attempt and earns a fixed reminder; a
//! ruleset that fails validation costs an attempt and earns a feedback
//! prompt built from the engine trace. All attempts within one call share
//! one conversation context unless the caller asks for a fresh one.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use tracing::{debug, instrument};

use crate::agent::AgentStatus;
use crate::config::AutoformalizationConfig;
use crate::llm::{LanguageModel, parse_axioms, process_trace};
use crate::solver::Solver;

/// Sent when the model ignored the delimiter convention.
pub const DELIMITER_REMINDER: &str =
    "Follow the rules of marking the beginning and the end of the code.";

/// Default repair prompt; `code` is the rejected ruleset, `messages` the
/// feedback lines derived from the engine trace.
pub const DEFAULT_FEEDBACK_TEMPLATE: &str = "\
The following code you produced is not valid:

{{ code }}

The engine reported:

{{ messages }}

Fix the code and return the full corrected version between @ delimiters.";

pub struct Autoformalizer {
    model: Box<dyn LanguageModel>,
    max_attempts: u32,
    attempts: u32,
    instruction_prompt: String,
    feedback_template: String,
    trace_messages: Vec<String>,
}

impl Autoformalizer {
    pub fn new(model: Box<dyn LanguageModel>, max_attempts: u32) -> Self {
        Self {
            model,
            max_attempts,
            attempts: 0,
            instruction_prompt: String::new(),
            feedback_template: DEFAULT_FEEDBACK_TEMPLATE.to_string(),
            trace_messages: Vec::new(),
        }
    }

    pub fn from_config(model: Box<dyn LanguageModel>, config: &AutoformalizationConfig) -> Self {
        Self::new(model, config.max_attempts)
    }

    pub fn set_instruction_prompt(&mut self, prompt: impl Into<String>) {
        self.instruction_prompt = prompt.into();
    }

    pub fn set_feedback_template(&mut self, template: impl Into<String>) {
        self.feedback_template = template.into();
    }

    /// Attempts consumed by the last [`Autoformalizer::autoformalize`] call.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Validation traces collected across the last call's failed attempts.
    pub fn trace_messages(&self) -> &[String] {
        &self.trace_messages
    }

    pub fn restore(&mut self, attempts: u32, trace_messages: Vec<String>) {
        self.attempts = attempts;
        self.trace_messages = trace_messages;
    }

    /// Run the retry loop until a ruleset validates or attempts run out.
    ///
    /// Returns the last-produced rules (possibly invalid on exhaustion) and
    /// the final status: `Correct`, `SyntacticError`, or `InstructionError`.
    #[instrument(skip_all, fields(max_attempts = self.max_attempts))]
    pub fn autoformalize(
        &mut self,
        solver: &mut Solver,
        clear_context: bool,
    ) -> Result<(Option<String>, AgentStatus)> {
        if clear_context {
            self.model.clear_context();
        }
        self.attempts = 0;
        self.trace_messages.clear();

        let mut status = AgentStatus::Initializing;
        let mut rules: Option<String> = None;
        let mut feedback_lines = String::new();

        while self.attempts < self.max_attempts {
            let prompt = match status {
                AgentStatus::Initializing => self.instruction_prompt.clone(),
                AgentStatus::InstructionError => DELIMITER_REMINDER.to_string(),
                AgentStatus::SyntacticError => {
                    // Drop engine state asserted by the failed attempt.
                    solver.reload().context("reload engine for repair attempt")?;
                    self.render_feedback(
                        rules.as_deref().unwrap_or_default(),
                        &feedback_lines,
                    )?
                }
                _ => break,
            };

            let response = self.model.prompt(&prompt)?;
            self.attempts += 1;

            let Some(code) = parse_axioms(&response) else {
                debug!(attempt = self.attempts, "response lacked delimiters");
                status = AgentStatus::InstructionError;
                continue;
            };

            let validation = solver.validate(&code);
            if validation.is_valid {
                debug!(attempt = self.attempts, "ruleset validated");
                rules = Some(code);
                status = AgentStatus::Correct;
                break;
            }

            debug!(attempt = self.attempts, trace = %validation.trace, "ruleset rejected");
            let processed = process_trace(&validation.trace, &code);
            feedback_lines = if processed.is_empty() {
                validation.trace.clone()
            } else {
                processed
            };
            self.trace_messages.push(validation.trace);
            rules = Some(code);
            status = AgentStatus::SyntacticError;
        }

        Ok((rules, status))
    }

    fn render_feedback(&self, code: &str, messages: &str) -> Result<String> {
        let mut env = Environment::new();
        env.add_template("feedback", &self.feedback_template)
            .context("register feedback template")?;
        let template = env
            .get_template("feedback")
            .context("load feedback template")?;
        template
            .render(context! { code, messages })
            .context("render feedback prompt")
    }
}
