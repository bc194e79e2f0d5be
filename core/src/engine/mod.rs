//! Query engine boundary
//!
//! The scheduler talks to a database through [`QueryEngine`] only. Calls are
//! synchronous and may block for as long as the statement takes; the
//! scheduler is responsible for keeping them off the caller's thread.

pub mod postgres;

pub use crate::error::EngineError;
pub use crate::types::QueryOutput;

/// A single logical connection that runs one statement at a time.
pub trait QueryEngine: Send + Sync {
    fn execute(&self, statement: &str) -> Result<QueryOutput, EngineError>;
}
