//! Per-action status records
//!
//! Every user action produces an ordered stream of status records: the
//! submitted transaction hash, the confirmed inclusion block, informational
//! progress notes, partial-success notices and terminal failures. Records are
//! pushed through a sink so the API layer can return them and tests can
//! assert on them.

use crate::error::{OrchestratorError, OrchestratorResult};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ethers::types::H256;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Stage of an action's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Info,
    Submitted,
    Confirmed,
    PartialSuccess,
    Success,
    Failed,
}

/// A single status record shown to the user
#[derive(Debug, Clone, Serialize)]
pub struct StatusRecord {
    pub action_id: Uuid,
    pub action: String,
    pub stage: Stage,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<H256>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    pub at: DateTime<Utc>,
}

/// Destination for status records
pub trait StatusSink: Send + Sync {
    fn report(&self, record: StatusRecord);
}

/// Default sink: structured logs only
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn report(&self, record: StatusRecord) {
        match record.stage {
            Stage::Failed => tracing::warn!(
                action = %record.action,
                stage = ?record.stage,
                "{}",
                record.message
            ),
            _ => tracing::info!(
                action = %record.action,
                stage = ?record.stage,
                "{}",
                record.message
            ),
        }
    }
}

/// Sink that keeps records in memory; used by the API layer to build
/// responses and by tests to assert on ordering
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<StatusRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<StatusRecord> {
        self.records.lock().expect("status sink poisoned").clone()
    }
}

impl StatusSink for MemorySink {
    fn report(&self, record: StatusRecord) {
        self.records
            .lock()
            .expect("status sink poisoned")
            .push(record);
    }
}

/// Reporter bound to one action invocation
#[derive(Clone)]
pub struct StatusReporter {
    action: String,
    action_id: Uuid,
    sink: Arc<dyn StatusSink>,
}

impl StatusReporter {
    pub fn new(action: impl Into<String>, sink: Arc<dyn StatusSink>) -> Self {
        Self {
            action: action.into(),
            action_id: Uuid::new_v4(),
            sink,
        }
    }

    pub fn action_id(&self) -> Uuid {
        self.action_id
    }

    fn emit(
        &self,
        stage: Stage,
        message: String,
        tx_hash: Option<H256>,
        block_number: Option<u64>,
    ) {
        self.sink.report(StatusRecord {
            action_id: self.action_id,
            action: self.action.clone(),
            stage,
            message,
            tx_hash,
            block_number,
            at: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(Stage::Info, message.into(), None, None);
    }

    pub fn submitted(&self, message: impl Into<String>, tx_hash: H256) {
        self.emit(Stage::Submitted, message.into(), Some(tx_hash), None);
    }

    pub fn confirmed(&self, message: impl Into<String>, tx_hash: H256, block_number: u64) {
        self.emit(
            Stage::Confirmed,
            message.into(),
            Some(tx_hash),
            Some(block_number),
        );
    }

    pub fn partial_success(&self, message: impl Into<String>) {
        self.emit(Stage::PartialSuccess, message.into(), None, None);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.emit(Stage::Success, message.into(), None, None);
    }

    pub fn failed(&self, message: impl Into<String>) {
        self.emit(Stage::Failed, message.into(), None, None);
    }
}

/// Guards against duplicate submissions: at most one in-flight intent per
/// action kind. This is the only concurrency control in the system.
#[derive(Default)]
pub struct ActionGuard {
    in_flight: DashMap<String, Uuid>,
}

impl ActionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an action, failing if one of the same kind is already running
    pub fn begin(self: &Arc<Self>, action: &str) -> OrchestratorResult<ActionPermit> {
        let token = Uuid::new_v4();
        match self.in_flight.entry(action.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(OrchestratorError::ActionInFlight {
                action: action.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(token);
                Ok(ActionPermit {
                    guard: self.clone(),
                    action: action.to_string(),
                })
            }
        }
    }
}

/// Releases the action slot on drop, re-enabling the triggering control
pub struct ActionPermit {
    guard: Arc<ActionGuard>,
    action: String,
}

impl Drop for ActionPermit {
    fn drop(&mut self) {
        self.guard.in_flight.remove(&self.action);
    }
}
