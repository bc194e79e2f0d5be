//! Per-buffer execution session
//!
//! Composes the segmenter, cursor resolver and scheduler behind a small
//! state machine that allows exactly one outstanding run at a time:
//!
//! ```text
//! Idle --run_all/run_current--> Running --cancel--> Cancelling
//!   ^                              |                    |
//!   +------- report delivered -----+--------------------+
//! ```

#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cursor;
use crate::engine::QueryEngine;
use crate::error::SessionError;
use crate::parser;
use crate::scheduler::{self, ExecutionHandle, FailurePolicy, ScheduledStatement, SchedulerOptions};
use crate::types::ExecutionBatchReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Cancelling,
}

struct Inner {
    state: SessionState,
    cancel: Option<CancellationToken>,
}

/// Coordinator for one buffer and one engine connection.
pub struct ExecutionSession {
    id: Uuid,
    engine: Arc<dyn QueryEngine>,
    policy: Arc<dyn FailurePolicy>,
    options: SchedulerOptions,
    inner: Arc<Mutex<Inner>>,
}

impl ExecutionSession {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        policy: Arc<dyn FailurePolicy>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine,
            policy,
            options,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                cancel: None,
            })),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Execute every statement in `buffer`, in order.
    pub fn run_all(&self, buffer: &str) -> Result<ExecutionHandle, SessionError> {
        let statements: Vec<ScheduledStatement> =
            parser::parse(buffer).iter().map(ScheduledStatement::from).collect();

        self.start(statements)
    }

    /// Execute the statement at `cursor_offset` (a character offset).
    pub fn run_current(
        &self,
        buffer: &str,
        cursor_offset: usize,
    ) -> Result<ExecutionHandle, SessionError> {
        let descriptors = parser::parse(buffer);
        let statements: Vec<ScheduledStatement> = cursor::resolve(&descriptors, cursor_offset)
            .map(ScheduledStatement::from)
            .into_iter()
            .collect();

        self.start(statements)
    }

    /// Request cancellation of the current run.
    ///
    /// Returns `false` when there is nothing to cancel (idle, or already
    /// cancelling).
    pub fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return false;
        }

        inner.state = SessionState::Cancelling;
        if let Some(token) = &inner.cancel {
            token.cancel();
        }
        tracing::info!(session = %self.id, "cancellation requested");
        true
    }

    fn start(&self, statements: Vec<ScheduledStatement>) -> Result<ExecutionHandle, SessionError> {
        let mut inner = self.lock();
        if inner.state != SessionState::Idle {
            tracing::warn!(session = %self.id, state = ?inner.state, "run rejected, session busy");
            return Err(SessionError::Busy(inner.state));
        }

        if statements.is_empty() {
            tracing::debug!(session = %self.id, "nothing to execute");
            return Ok(ExecutionHandle::completed(ExecutionBatchReport::empty()));
        }

        let cancel = CancellationToken::new();
        inner.state = SessionState::Running;
        inner.cancel = Some(cancel.clone());

        tracing::info!(session = %self.id, statements = statements.len(), "run started");

        let shared = Arc::clone(&self.inner);
        let session_id = self.id;
        let on_finish = Box::new(move || {
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            inner.state = SessionState::Idle;
            inner.cancel = None;
            tracing::debug!(session = %session_id, "session idle");
        });

        Ok(scheduler::spawn(
            statements,
            Arc::clone(&self.engine),
            Arc::clone(&self.policy),
            self.options,
            cancel,
            Some(on_finish),
        ))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
