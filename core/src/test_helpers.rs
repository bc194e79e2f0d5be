//! Test helpers - in-process engines for scheduler and session tests

use std::collections::HashMap;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;

use crate::engine::{EngineError, QueryEngine, QueryOutput};

/// Engine that succeeds with one row echoing the statement, except for
/// statements listed in `failures`, which fail with the mapped message.
#[derive(Default)]
pub struct ScriptedEngine {
    failures: HashMap<String, String>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(failures: HashMap<&str, &str>) -> Self {
        Self {
            failures: failures
                .into_iter()
                .map(|(statement, message)| (statement.to_string(), message.to_string()))
                .collect(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Statements seen so far, in call order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl QueryEngine for ScriptedEngine {
    fn execute(&self, statement: &str) -> Result<QueryOutput, EngineError> {
        self.executed.lock().unwrap().push(statement.to_string());

        match self.failures.get(statement) {
            Some(message) => Err(EngineError::new(message.clone())),
            None => Ok(QueryOutput::rows(
                vec!["statement".to_string()],
                vec![vec![json!(statement)]],
            )),
        }
    }
}

/// Engine that blocks inside one chosen statement until the test releases it.
pub struct GatedEngine {
    inner: ScriptedEngine,
    gated: String,
    entered: mpsc::UnboundedSender<String>,
    release: Mutex<std_mpsc::Receiver<()>>,
}

/// Test side of a [`GatedEngine`].
pub struct Gate {
    entered: mpsc::UnboundedReceiver<String>,
    release: std_mpsc::Sender<()>,
}

impl Gate {
    /// Wait until the engine is blocked inside the gated statement.
    pub async fn wait_entered(&mut self) -> String {
        self.entered.recv().await.expect("gated engine dropped")
    }

    pub fn release(&self) {
        self.release.send(()).ok();
    }
}

pub fn gated_engine(gated: &str) -> (Arc<GatedEngine>, Gate) {
    gated_engine_with(ScriptedEngine::new(), gated)
}

pub fn gated_engine_with(inner: ScriptedEngine, gated: &str) -> (Arc<GatedEngine>, Gate) {
    let (entered_tx, entered_rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = std_mpsc::channel();

    let engine = GatedEngine {
        inner,
        gated: gated.to_string(),
        entered: entered_tx,
        release: Mutex::new(release_rx),
    };
    let gate = Gate {
        entered: entered_rx,
        release: release_tx,
    };

    (Arc::new(engine), gate)
}

impl GatedEngine {
    pub fn executed(&self) -> Vec<String> {
        self.inner.executed()
    }
}

impl QueryEngine for GatedEngine {
    fn execute(&self, statement: &str) -> Result<QueryOutput, EngineError> {
        if statement == self.gated {
            self.entered.send(statement.to_string()).ok();
            // Released explicitly, or unblocked when the Gate is dropped
            self.release.lock().unwrap().recv().ok();
        }
        self.inner.execute(statement)
    }
}

/// Engine whose every call panics.
pub struct PanickingEngine;

impl QueryEngine for PanickingEngine {
    fn execute(&self, _statement: &str) -> Result<QueryOutput, EngineError> {
        panic!("engine exploded");
    }
}
