//! Language model capability boundary and response/trace parsing.
//!
//! The core never talks to a concrete model; it sees [`LanguageModel`]:
//! `prompt` in, opaque text out, optionally stateful. Responses must carry
//! the ruleset between `@` delimiter lines; [`parse_axioms`] extracts it.
//! Engine stderr captured during a failed validation is turned into feedback
//! lines by [`process_trace`].

use std::sync::OnceLock;

use anyhow::Result;
use regex::Regex;

/// A conversational language model: opaque text in, opaque text out.
pub trait LanguageModel: Send {
    fn prompt(&mut self, text: &str) -> Result<String>;

    /// Forget the conversation history, if the model keeps one.
    fn clear_context(&mut self);
}

/// Extract the ruleset between `@` delimiters, or `None` if the response
/// does not follow the delimiter convention.
pub fn parse_axioms(response: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^@([^@]+)@").expect("axiom delimiter pattern should be valid")
    });
    pattern
        .captures(response)
        .map(|captures| captures[1].to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    Warning,
    Error,
}

impl TraceKind {
    fn as_str(self) -> &'static str {
        match self {
            TraceKind::Warning => "Warning",
            TraceKind::Error => "Error",
        }
    }
}

/// One warning or error extracted from engine diagnostic output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub kind: TraceKind,
    /// 1-based line number in the consulted ruleset.
    pub line: usize,
    pub message: String,
}

/// Parse raw engine stderr into warning/error entries.
///
/// SWI-Prolog reports a warning as a location line (`Warning: <file>:<line>:`)
/// followed by indented continuation lines, and an error as a single line
/// (`ERROR: <file>:<line>:<column>: <message>`).
pub fn parse_trace(log: &str) -> Vec<TraceEntry> {
    static WARNING_START: OnceLock<Regex> = OnceLock::new();
    static WARNING_MESSAGE: OnceLock<Regex> = OnceLock::new();
    static ERROR_LINE: OnceLock<Regex> = OnceLock::new();
    let warning_start = WARNING_START
        .get_or_init(|| Regex::new(r"^Warning: .*?:(\d+):").expect("warning pattern"));
    let warning_message = WARNING_MESSAGE
        .get_or_init(|| Regex::new(r"^Warning:\s+(.*)").expect("warning message pattern"));
    let error_line = ERROR_LINE
        .get_or_init(|| Regex::new(r"^ERROR: .*?:(\d+):(\d+):\s*(.*)").expect("error pattern"));

    let mut entries = Vec::new();
    let mut current_warning: Option<TraceEntry> = None;

    for line in log.lines() {
        if let Some(captures) = warning_start.captures(line) {
            if let Some(warning) = current_warning.take() {
                entries.push(warning);
            }
            let line_number = captures[1].parse().unwrap_or(0);
            current_warning = Some(TraceEntry {
                kind: TraceKind::Warning,
                line: line_number,
                message: String::new(),
            });
            continue;
        }

        if let Some(warning) = current_warning.as_mut()
            && let Some(captures) = warning_message.captures(line)
        {
            warning.message.push_str(captures[1].trim());
            warning.message.push(' ');
        }

        if let Some(captures) = error_line.captures(line) {
            let line_number = captures[1].parse().unwrap_or(0);
            entries.push(TraceEntry {
                kind: TraceKind::Error,
                line: line_number,
                message: captures[3].trim().to_string(),
            });
        }
    }

    if let Some(warning) = current_warning.take() {
        entries.push(warning);
    }

    for entry in &mut entries {
        entry.message = entry.message.trim().to_string();
    }
    entries
}

/// Turn a diagnostic trace into feedback lines that point at the offending
/// ruleset lines, for the repair prompt.
pub fn process_trace(trace: &str, rules: &str) -> String {
    let rule_lines: Vec<&str> = rules.lines().collect();
    let mut feedback = String::new();
    for entry in parse_trace(trace) {
        let Some(content) = entry
            .line
            .checked_sub(1)
            .and_then(|index| rule_lines.get(index))
        else {
            continue;
        };
        feedback.push_str(&format!(
            "Line: {content} produced {}: {}\n",
            entry.kind.as_str(),
            entry.message
        ));
    }
    feedback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_axioms_extracts_delimited_block() {
        let response = "Here are the rules:\n@\nselect(_, _, s0, defect).\n@\nDone.";
        let rules = parse_axioms(response).expect("rules");
        assert!(rules.contains("select(_, _, s0, defect)."));
    }

    #[test]
    fn parse_axioms_rejects_missing_delimiters() {
        assert_eq!(parse_axioms("select(_, _, s0, defect)."), None);
    }

    #[test]
    fn parse_trace_collects_multiline_warnings() {
        let log = "Warning: /tmp/ruleset-1.pl:2:\nWarning:    Singleton variables: [X]\n";
        let entries = parse_trace(log);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TraceKind::Warning);
        assert_eq!(entries[0].line, 2);
        assert_eq!(entries[0].message, "Singleton variables: [X]");
    }

    #[test]
    fn parse_trace_collects_errors_with_position() {
        let log = "ERROR: /tmp/ruleset-1.pl:3:12: Syntax error: operator expected\n";
        let entries = parse_trace(log);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, TraceKind::Error);
        assert_eq!(entries[0].line, 3);
        assert_eq!(entries[0].message, "Syntax error: operator expected");
    }

    #[test]
    fn process_trace_points_at_offending_lines() {
        let rules = "select(P, _, s0, M) :-\n    holds(last_move(_, X), s0).\n";
        let log = "Warning: /tmp/ruleset-1.pl:2:\nWarning:    Singleton variables: [X]\n";
        let feedback = process_trace(log, rules);
        assert_eq!(
            feedback,
            "Line:     holds(last_move(_, X), s0). produced Warning: Singleton variables: [X]\n"
        );
    }

    #[test]
    fn process_trace_skips_out_of_range_lines() {
        let feedback = process_trace("ERROR: /tmp/x.pl:42:1: whatever\n", "one line\n");
        assert!(feedback.is_empty());
    }
}
