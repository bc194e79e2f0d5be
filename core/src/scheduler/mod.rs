//! Sequential statement scheduler
//!
//! Runs a list of statements through a [`QueryEngine`] one at a time on a
//! dedicated blocking worker, streaming [`ExecutionEvent`]s back to the
//! caller. Statement `i + 1` is never submitted before statement `i` returns.
//! Cancellation is cooperative and only checked between statements: an
//! engine call in flight always runs to completion and is recorded.

pub mod handle;
pub mod policy;


use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::QueryEngine;
use crate::types::{ExecutionBatchReport, ExecutionEvent, ExecutionResult, StatementDescriptor};

pub use handle::ExecutionHandle;
pub use policy::{FailurePolicy, OnError, PolicyDecision};

/* ===================== Inputs ===================== */

/// A statement queued for execution, tagged with its position in the buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledStatement {
    pub sequence_index: usize,
    pub text: String,
}

impl ScheduledStatement {
    /// Number plain statement texts 0, 1, 2, ...
    pub fn numbered<I, S>(texts: I) -> Vec<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Self {
                sequence_index,
                text: text.into(),
            })
            .collect()
    }
}

impl From<&StatementDescriptor> for ScheduledStatement {
    fn from(descriptor: &StatementDescriptor) -> Self {
        Self {
            sequence_index: descriptor.sequence_index,
            text: descriptor.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Characters of statement text carried by progress events
    pub preview_chars: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            preview_chars: 100,
        }
    }
}

/* ===================== Public API ===================== */

/// Start executing `statements` in order on a background worker.
///
/// Must be called from within a Tokio runtime.
pub fn run_sequence(
    statements: Vec<ScheduledStatement>,
    engine: Arc<dyn QueryEngine>,
    policy: Arc<dyn FailurePolicy>,
    options: SchedulerOptions,
) -> ExecutionHandle {
    spawn(
        statements,
        engine,
        policy,
        options,
        CancellationToken::new(),
        None,
    )
}

/// Runs right before the `Report` event is sent, or when the worker dies.
pub(crate) type OnFinish = Box<dyn FnOnce() + Send>;

pub(crate) fn spawn(
    statements: Vec<ScheduledStatement>,
    engine: Arc<dyn QueryEngine>,
    policy: Arc<dyn FailurePolicy>,
    options: SchedulerOptions,
    cancel: CancellationToken,
    on_finish: Option<OnFinish>,
) -> ExecutionHandle {
    // Unbounded so a caller that stops reading can never stall the worker
    let (sender, receiver) = mpsc::unbounded_channel();

    let worker = Worker {
        statements,
        engine,
        policy,
        options,
        events: sender,
        events_closed: false,
        cancel: cancel.clone(),
        finish: FinishGuard(on_finish),
    };

    let join = tokio::task::spawn_blocking(move || worker.run());

    ExecutionHandle::new(receiver, cancel, join)
}

/* ===================== Worker ===================== */

struct FinishGuard(Option<OnFinish>);

impl FinishGuard {
    fn fire(&mut self) {
        if let Some(on_finish) = self.0.take() {
            on_finish();
        }
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.fire();
    }
}

struct Worker {
    statements: Vec<ScheduledStatement>,
    engine: Arc<dyn QueryEngine>,
    policy: Arc<dyn FailurePolicy>,
    options: SchedulerOptions,
    events: mpsc::UnboundedSender<ExecutionEvent>,
    events_closed: bool,
    cancel: CancellationToken,
    finish: FinishGuard,
}

impl Worker {
    fn run(mut self) {
        let started = Instant::now();
        let statements = std::mem::take(&mut self.statements);
        let total = statements.len();
        let mut results = Vec::with_capacity(total);
        let mut aborted = false;

        tracing::info!(total, "starting statement batch");

        for (index, statement) in statements.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(completed = index, skipped = total - index, "batch cancelled");
                break;
            }

            self.emit(ExecutionEvent::Progress {
                index,
                total,
                sequence_index: statement.sequence_index,
                preview: preview(&statement.text, self.options.preview_chars),
            });

            let result = self.execute(statement);
            self.emit(ExecutionEvent::Result(result.clone()));

            let decision = if result.success {
                PolicyDecision::Continue
            } else {
                self.policy.on_failure(&result)
            };
            results.push(result);

            if decision == PolicyDecision::Abort {
                tracing::warn!(
                    sequence_index = statement.sequence_index,
                    skipped = total - index - 1,
                    "batch aborted by failure policy"
                );
                aborted = true;
                break;
            }
        }

        // A cancel that lands during the last statement skips nothing but is still reported
        let cancelled = self.cancel.is_cancelled();
        let report =
            ExecutionBatchReport::from_results(results, total, cancelled, aborted, started.elapsed());

        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            elapsed_ms = report.total_elapsed.as_millis() as u64,
            "statement batch finished"
        );

        self.finish.fire();
        self.emit(ExecutionEvent::Report(report));
    }

    fn execute(&self, statement: &ScheduledStatement) -> ExecutionResult {
        let started_at = Utc::now();
        let clock = Instant::now();

        tracing::debug!(sequence_index = statement.sequence_index, "executing statement");

        match self.engine.execute(&statement.text) {
            Ok(output) => ExecutionResult::succeeded(
                statement.sequence_index,
                statement.text.clone(),
                output,
                started_at,
                clock.elapsed(),
            ),
            Err(err) => {
                tracing::warn!(
                    sequence_index = statement.sequence_index,
                    error = %err,
                    "statement failed"
                );
                ExecutionResult::failed(
                    statement.sequence_index,
                    statement.text.clone(),
                    err.message(),
                    started_at,
                    clock.elapsed(),
                )
            }
        }
    }

    /// Deliver an event. A caller that stopped listening does not stop the
    /// batch; the remaining statements still run.
    fn emit(&mut self, event: ExecutionEvent) {
        if self.events_closed {
            return;
        }
        if self.events.send(event).is_err() {
            tracing::debug!("event receiver dropped, continuing without events");
            self.events_closed = true;
        }
    }
}

/// Single-line statement preview, cut to `max_chars` characters.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let cut: String = flattened.chars().take(max_chars).collect();
    format!("{}...", cut)
}
