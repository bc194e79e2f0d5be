pub mod cli;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod history;
pub mod logging;
pub mod parser;
pub mod scheduler;
pub mod session;
pub mod types;

#[cfg(test)]
pub mod test_helpers;

// Re-export main types
pub use types::*;

pub use cursor::resolve;
pub use engine::QueryEngine;
pub use error::{EngineError, RunError, SessionError};
pub use history::HistoryEntry;
pub use parser::parse;
pub use scheduler::{
    run_sequence, ExecutionHandle, FailurePolicy, OnError, PolicyDecision, ScheduledStatement,
    SchedulerOptions,
};
pub use session::{ExecutionSession, SessionState};
