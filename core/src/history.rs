//! History records built from delivered results.
//!
//! The crate never persists these; callers hand them to whatever store they
//! keep (the CLI prints them as JSON lines).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::types::ExecutionResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sequence_index: usize,
    /// Short SHA-256 of the whitespace-normalized statement
    pub fingerprint: String,
    pub sql: String,
    pub executed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub row_count: Option<u64>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl HistoryEntry {
    pub fn from_result(session_id: Uuid, result: &ExecutionResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sequence_index: result.sequence_index,
            fingerprint: fingerprint(&result.statement),
            sql: result.statement.clone(),
            executed_at: result.started_at,
            elapsed_ms: result.elapsed.as_millis() as u64,
            row_count: result.row_count,
            success: result.success,
            error_message: result.error_message.clone(),
        }
    }
}

/// Stable identifier for a statement, insensitive to whitespace layout.
pub fn fingerprint(sql: &str) -> String {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
