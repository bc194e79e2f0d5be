//! Error types shared across the crate.
//!
//! Parsing never fails and engine failures become failed results, so the
//! only errors a caller sees from a run request are the ones below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionState;

/// A single statement's engine call failed. The message is kept verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Rejections of a run request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is busy ({0:?}); wait for the current run to report")]
    Busy(SessionState),
}

/// Failures while waiting for a run's report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("execution worker terminated before delivering a report")]
    WorkerLost(#[source] Option<tokio::task::JoinError>),
}
