//! Failure policies
//!
//! After a statement fails the scheduler asks the caller's policy whether to
//! keep going. The crate ships no default; callers pick one explicitly.

use serde::{Deserialize, Serialize};

use crate::types::ExecutionResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Continue,
    Abort,
}

/// Consulted once per failed statement, on the worker thread.
pub trait FailurePolicy: Send + Sync {
    fn on_failure(&self, result: &ExecutionResult) -> PolicyDecision;
}

impl<F> FailurePolicy for F
where
    F: Fn(&ExecutionResult) -> PolicyDecision + Send + Sync,
{
    fn on_failure(&self, result: &ExecutionResult) -> PolicyDecision {
        self(result)
    }
}

/// Fixed policy, selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    Continue,
    Abort,
}

impl FailurePolicy for OnError {
    fn on_failure(&self, _result: &ExecutionResult) -> PolicyDecision {
        match self {
            OnError::Continue => PolicyDecision::Continue,
            OnError::Abort => PolicyDecision::Abort,
        }
    }
}

impl std::str::FromStr for OnError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(OnError::Continue),
            "abort" => Ok(OnError::Abort),
            _ => Err(format!("Invalid on-error policy: {}. Must be one of: continue, abort", s)),
        }
    }
}
