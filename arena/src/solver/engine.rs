//! Engine abstraction for rule evaluation.
//!
//! The [`Engine`] trait decouples the solver from the concrete rule engine
//! (currently a SWI-Prolog child process). Tests substitute in-memory engines
//! that implement the same goal-template contract without spawning processes.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

/// Outcome of one consult or query against the engine.
///
/// A query with no solutions is a failure with a descriptive error, never an
/// empty success; callers must check `success` before using `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub success: bool,
    /// First captured variable per solution, in solution order.
    pub values: Vec<String>,
    pub error: Option<String>,
}

impl QueryResult {
    pub fn ok(values: Vec<String>) -> Self {
        Self {
            success: true,
            values,
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            values: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// First solution value, if the query succeeded with at least one.
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}

/// One live session against an external rule-evaluation engine.
///
/// Every `query` may mutate engine-resident state when the goal asserts or
/// retracts facts; callers are responsible for sequencing such calls. The
/// session provides no implicit locking.
pub trait Engine: Send {
    /// Load one source file into the session.
    fn consult(&mut self, path: &Path) -> QueryResult;

    /// Execute one goal synchronously, truncating solutions to `limit`.
    fn query(&mut self, goal: &str, limit: Option<usize>) -> QueryResult;

    /// Release the underlying process/thread. Idempotent; teardown errors are
    /// logged, never propagated.
    fn stop(&mut self);

    /// Take the diagnostic output the engine emitted since the last drain
    /// (warnings and errors that do not fail a consult but indicate unsafe
    /// rules).
    fn drain_diagnostics(&mut self) -> String;
}

/// Factory for fresh engine sessions, used when a solver must discard
/// engine-resident state and start over.
pub type EngineFactory = Arc<dyn Fn() -> Result<Box<dyn Engine>> + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_returns_none_for_empty_values() {
        let result = QueryResult::ok(Vec::new());
        assert!(result.success);
        assert_eq!(result.first(), None);
    }

    #[test]
    fn fail_carries_the_error() {
        let result = QueryResult::fail("no solutions");
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("no solutions"));
        assert!(result.values.is_empty());
    }
}
