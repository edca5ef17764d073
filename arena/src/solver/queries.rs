//! Fixed goal templates for the game queries.
//!
//! Goal strings are built by substituting vetted arguments into the templates
//! below; nothing else is ever sent to the engine for gameplay. An argument
//! containing quote or control characters is rejected *before* a goal string
//! exists, so it can never reach the engine.

use std::fmt;

pub const POSSIBLE_MOVES_GOAL: &str = "possible(move(_,X), s0).";
pub const PLAYER_NAMES_GOAL: &str = "holds(player(N), s0).";

/// An argument that may not be substituted into a goal template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidGoalArg {
    pub arg: String,
    pub reason: &'static str,
}

impl fmt::Display for InvalidGoalArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected goal argument {:?}: {}", self.arg, self.reason)
    }
}

impl std::error::Error for InvalidGoalArg {}

/// Player names are substituted as bare atoms and must look like one.
fn check_bare_atom(arg: &str) -> Result<(), InvalidGoalArg> {
    let mut chars = arg.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_lowercase()
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(InvalidGoalArg {
            arg: arg.to_string(),
            reason: "not a bare atom ([a-z][a-zA-Z0-9_]*)",
        })
    }
}

/// Moves are substituted inside single quotes and must not escape them.
fn check_quoted_atom(arg: &str) -> Result<(), InvalidGoalArg> {
    if arg.is_empty() {
        return Err(InvalidGoalArg {
            arg: arg.to_string(),
            reason: "empty",
        });
    }
    if arg
        .chars()
        .any(|c| c == '\'' || c == '"' || c == '\\' || c.is_control())
    {
        return Err(InvalidGoalArg {
            arg: arg.to_string(),
            reason: "contains quote, backslash, or control characters",
        });
    }
    Ok(())
}

pub fn default_move_goal(player: &str) -> Result<String, InvalidGoalArg> {
    check_bare_atom(player)?;
    Ok(format!("initially(default_move({player}, X), s0)."))
}

pub fn select_move_goal(agent: &str) -> Result<String, InvalidGoalArg> {
    check_bare_atom(agent)?;
    Ok(format!("select({agent}, _, s0, M)."))
}

pub fn payoff_goal(
    player: &str,
    opponent: &str,
    player_move: &str,
    opponent_move: &str,
) -> Result<String, InvalidGoalArg> {
    check_bare_atom(player)?;
    check_bare_atom(opponent)?;
    check_quoted_atom(player_move)?;
    check_quoted_atom(opponent_move)?;
    Ok(format!(
        "finally(goal({player}, U), do(move({player},'{player_move}'), \
         do(move({opponent},'{opponent_move}'), s0)))."
    ))
}

pub fn update_last_move_goal(opponent: &str, mv: &str) -> Result<String, InvalidGoalArg> {
    check_bare_atom(opponent)?;
    check_quoted_atom(mv)?;
    Ok(format!("initialise(last_move({opponent},'{mv}'), s0)."))
}

pub fn update_default_move_goal(mv: &str) -> Result<String, InvalidGoalArg> {
    check_quoted_atom(mv)?;
    Ok(format!("initialise(default_move(_,'{mv}'), s0)."))
}

/// Required-predicate probe, `name` given either bare or as `name/arity`.
pub fn current_predicate_goal(name: &str) -> Result<String, InvalidGoalArg> {
    match name.split_once('/') {
        Some((functor, arity)) => {
            check_bare_atom(functor)?;
            if arity.is_empty() || !arity.chars().all(|c| c.is_ascii_digit()) {
                return Err(InvalidGoalArg {
                    arg: name.to_string(),
                    reason: "arity is not a number",
                });
            }
        }
        None => check_bare_atom(name)?,
    }
    Ok(format!("current_predicate({name})."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_match_the_wire_contract() {
        assert_eq!(
            default_move_goal("me").unwrap(),
            "initially(default_move(me, X), s0)."
        );
        assert_eq!(select_move_goal("me").unwrap(), "select(me, _, s0, M).");
        assert_eq!(
            payoff_goal("me", "opponent", "defect", "cooperate").unwrap(),
            "finally(goal(me, U), do(move(me,'defect'), do(move(opponent,'cooperate'), s0)))."
        );
        assert_eq!(
            update_last_move_goal("opponent", "defect").unwrap(),
            "initialise(last_move(opponent,'defect'), s0)."
        );
        assert_eq!(
            update_default_move_goal("defect").unwrap(),
            "initialise(default_move(_,'defect'), s0)."
        );
        assert_eq!(
            current_predicate_goal("select/4").unwrap(),
            "current_predicate(select/4)."
        );
    }

    #[test]
    fn quoted_arguments_reject_escapes() {
        assert!(payoff_goal("me", "opponent", "de'fect", "defect").is_err());
        assert!(update_last_move_goal("opponent", "a\\b").is_err());
        assert!(update_default_move_goal("a\nb").is_err());
        assert!(update_default_move_goal("").is_err());
    }

    #[test]
    fn bare_atoms_reject_injection() {
        // A crafted player name must never reach a goal string.
        let err = select_move_goal("me, _, s0, M), assert(x").unwrap_err();
        assert_eq!(err.reason, "not a bare atom ([a-z][a-zA-Z0-9_]*)");
        assert!(default_move_goal("Me").is_err());
        assert!(default_move_goal("").is_err());
    }

    #[test]
    fn predicate_probe_accepts_bare_and_indicator_forms() {
        assert!(current_predicate_goal("select").is_ok());
        assert!(current_predicate_goal("select/4").is_ok());
        assert!(current_predicate_goal("select/x").is_err());
        assert!(current_predicate_goal("sel ect/4").is_err());
    }
}
