use std::sync::Arc;

use maplit::hashmap;

use super::*;
use crate::scheduler::OnError;
use crate::test_helpers::{gated_engine, gated_engine_with, ScriptedEngine};

const BUFFER: &str = "SELECT 1;\nSELECT 2;\nSELECT 3;";

fn session(engine: Arc<dyn QueryEngine>) -> ExecutionSession {
    ExecutionSession::new(engine, Arc::new(OnError::Continue), SchedulerOptions::default())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_all_executes_buffer() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = session(engine.clone());

    let report = session.run_all(BUFFER).unwrap().report().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(engine.executed(), vec!["SELECT 1", "SELECT 2", "SELECT 3"]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_current_picks_statement_under_cursor() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = session(engine.clone());

    // Offset 12 is inside "SELECT 2"
    let report = session.run_current(BUFFER, 12).unwrap().report().await.unwrap();

    assert_eq!(report.total, 1);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].sequence_index, 1);
    assert_eq!(report.results[0].statement, "SELECT 2");
    assert_eq!(engine.executed(), vec!["SELECT 2"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_run_current_after_last_semicolon_uses_last_statement() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = session(engine.clone());

    let end = BUFFER.chars().count();
    let report = session.run_current(BUFFER, end).unwrap().report().await.unwrap();

    assert_eq!(report.results[0].sequence_index, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_buffer_reports_immediately_and_stays_idle() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = session(engine.clone());

    let handle = session.run_current("  -- nothing here\n", 3).unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    let report = handle.report().await.unwrap();
    assert_eq!(report.total, 0);
    assert!(report.results.is_empty());

    let report = session.run_all("   ").unwrap().report().await.unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(engine.executed().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_busy_session_rejects_runs() {
    let (engine, mut gate) = gated_engine("SELECT 1");
    let session = session(engine);

    let handle = session.run_all(BUFFER).unwrap();
    gate.wait_entered().await;
    assert_eq!(session.state(), SessionState::Running);

    let err = session.run_current(BUFFER, 0).err().unwrap();
    assert_eq!(err, SessionError::Busy(SessionState::Running));

    assert!(session.cancel());
    assert_eq!(session.state(), SessionState::Cancelling);
    assert!(!session.cancel());

    let err = session.run_all(BUFFER).err().unwrap();
    assert_eq!(err, SessionError::Busy(SessionState::Cancelling));

    // Empty runs are rejected too while busy
    let err = session.run_all("").err().unwrap();
    assert_eq!(err, SessionError::Busy(SessionState::Cancelling));

    gate.release();
    let report = handle.report().await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.skipped, 2);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_session_accepts_new_run_after_report() {
    let engine = Arc::new(ScriptedEngine::failing(hashmap! { "SELECT 2" => "boom" }));
    let session = session(engine.clone());

    let first = session.run_all(BUFFER).unwrap().report().await.unwrap();
    assert_eq!(first.failed, 1);

    let second = session.run_current(BUFFER, 0).unwrap().report().await.unwrap();
    assert_eq!(second.succeeded, 1);
    assert_eq!(engine.executed().len(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_when_idle_is_noop() {
    let session = session(Arc::new(ScriptedEngine::new()));

    assert!(!session.cancel());
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_independent_sessions_do_not_block_each_other() {
    let (blocked_engine, mut gate) =
        gated_engine_with(ScriptedEngine::new(), "SELECT 1");
    let blocked = session(blocked_engine);
    let free_engine = Arc::new(ScriptedEngine::new());
    let free = session(free_engine.clone());

    let blocked_handle = blocked.run_all(BUFFER).unwrap();
    gate.wait_entered().await;

    let report = free.run_all(BUFFER).unwrap().report().await.unwrap();
    assert_eq!(report.succeeded, 3);
    assert_eq!(blocked.state(), SessionState::Running);
    assert_ne!(blocked.id(), free.id());

    gate.release();
    let report = blocked_handle.report().await.unwrap();
    assert_eq!(report.succeeded, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_during_last_statement_is_reported() {
    let (engine, mut gate) = gated_engine("SELECT 3");
    let session = session(engine);

    let handle = session.run_all(BUFFER).unwrap();
    gate.wait_entered().await;

    assert!(session.cancel());
    assert_eq!(session.state(), SessionState::Cancelling);
    gate.release();

    let report = handle.report().await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.skipped, 0);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unread_events_do_not_stall_long_runs() {
    let engine = Arc::new(ScriptedEngine::new());
    let session = session(engine.clone());
    let buffer: String = (0..200).map(|i| format!("SELECT {};\n", i)).collect();

    // Hold the handle without reading until the session reports idle
    let handle = session.run_all(&buffer).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while session.state() != SessionState::Idle {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = handle.report().await.unwrap();
    assert_eq!(report.succeeded, 200);
    assert_eq!(engine.executed().len(), 200);
}
