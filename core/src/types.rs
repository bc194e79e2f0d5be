use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/* ===================== Segmentation ===================== */

/// Construct that was still open when the input ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ParseAmbiguity {
    UnterminatedSingleQuote,
    UnterminatedDoubleQuote,
    UnterminatedBlockComment,
}

/// One statement found in a buffer.
///
/// Offsets count characters, not bytes, and bound exactly `text`:
/// the characters of the source in `start_offset..end_offset` are `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementDescriptor {
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    /// 1-based, inclusive
    pub start_line: usize,
    /// 1-based, inclusive
    pub end_line: usize,
    pub sequence_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguity: Option<ParseAmbiguity>,
}

impl StatementDescriptor {
    /// Whether `offset` lies inside the statement text.
    pub fn contains(&self, offset: usize) -> bool {
        self.start_offset <= offset && offset < self.end_offset
    }
}

/* ===================== Execution ===================== */

/// Outcome of running one statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub sequence_index: usize,
    pub statement: String,
    pub success: bool,
    /// Present iff `success`.
    pub row_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<Vec<JsonValue>>,
    pub elapsed: Duration,
    /// Present iff not `success`.
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(
        sequence_index: usize,
        statement: impl Into<String>,
        output: QueryOutput,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            sequence_index,
            statement: statement.into(),
            success: true,
            row_count: Some(output.row_count),
            columns: output.columns,
            rows: output.rows,
            elapsed,
            error_message: None,
            started_at,
        }
    }

    pub fn failed(
        sequence_index: usize,
        statement: impl Into<String>,
        error_message: impl Into<String>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            sequence_index,
            statement: statement.into(),
            success: false,
            row_count: None,
            columns: Vec::new(),
            rows: Vec::new(),
            elapsed,
            error_message: Some(error_message.into()),
            started_at,
        }
    }
}

/// Outcome of one `run_all` / `run_current` invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionBatchReport {
    pub results: Vec<ExecutionResult>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_elapsed: Duration,
    pub cancelled: bool,
    /// The failure policy stopped the batch.
    pub aborted: bool,
}

impl ExecutionBatchReport {
    /// Report for a run that had nothing to execute.
    pub fn empty() -> Self {
        Self::from_results(Vec::new(), 0, false, false, Duration::ZERO)
    }

    pub fn from_results(
        results: Vec<ExecutionResult>,
        total: usize,
        cancelled: bool,
        aborted: bool,
        total_elapsed: Duration,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let skipped = total.saturating_sub(results.len());

        Self {
            results,
            total,
            succeeded,
            failed,
            skipped,
            total_elapsed,
            cancelled,
            aborted,
        }
    }

    /// Rows returned or affected across all successful statements.
    pub fn total_rows(&self) -> u64 {
        self.results.iter().filter_map(|r| r.row_count).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Events emitted by a running batch, in order. `Report` is always last.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    Progress {
        /// Position within this run, 0-based
        index: usize,
        total: usize,
        sequence_index: usize,
        preview: String,
    },
    Result(ExecutionResult),
    Report(ExecutionBatchReport),
}

/* ===================== Engine Output ===================== */

/// Tabular output of a successful engine call.
///
/// `row_count` is the number of rows returned for queries and the number of
/// affected rows for other statements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub row_count: u64,
}

impl QueryOutput {
    pub fn rows(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Self {
        let row_count = rows.len() as u64;
        Self {
            columns,
            rows,
            row_count,
        }
    }

    pub fn affected(row_count: u64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            row_count,
        }
    }
}
