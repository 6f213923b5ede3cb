//! Coordinator message types and JSON serialization.
//!
//! Inbound messages carry no type tag. They are routed by shape: a
//! `turboMode` field marks a turbo toggle, a `startNonce`/`endNonce` pair marks
//! a range push, and anything else is taken as a full task definition.

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::error::MessageError;
use crate::types::{Found, NonceRange, Task};

/// Sentinel the coordinator expects when the worker needs more work.
pub const RANGE_REQUEST: &str = "requestRange";

/// Messages received from the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorMessage {
    /// Enable or disable the throttling bypass
    Turbo(bool),

    /// Nonce range to scan, queued behind any current work
    Range(NonceRange),

    /// Initial or replacement task definition
    Task(Box<Task>),
}

impl CoordinatorMessage {
    /// Route a decoded JSON value to its message type.
    ///
    /// The shape check is minimal: only the fields needed to route the message
    /// are validated, plus whatever the chosen type needs to be usable.
    pub fn classify(value: Value) -> Result<Self, MessageError> {
        let Value::Object(fields) = value else {
            return Err(MessageError::NotAnObject);
        };

        if let Some(turbo) = fields.get("turboMode") {
            let enabled = turbo
                .as_bool()
                .ok_or(MessageError::InvalidField("turboMode"))?;
            return Ok(CoordinatorMessage::Turbo(enabled));
        }

        if let (Some(start), Some(end)) = (fields.get("startNonce"), fields.get("endNonce")) {
            let start = nonce_field(start, "startNonce")?;
            let end = nonce_field(end, "endNonce")?;
            let range =
                NonceRange::new(start, end).ok_or(MessageError::InvertedRange { start, end })?;
            return Ok(CoordinatorMessage::Range(range));
        }

        let task: Task = serde_json::from_value(Value::Object(fields))?;
        Ok(CoordinatorMessage::Task(Box::new(task)))
    }
}

fn nonce_field(value: &Value, name: &'static str) -> Result<u64, MessageError> {
    value.as_u64().ok_or(MessageError::InvalidField(name))
}

/// Kind of threshold a reported result met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultState {
    Valid,
    Share,
}

/// Result report sent for every valid result and share.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultReport {
    pub state: ResultState,
    pub score: String,
    pub payload: Value,
    pub nonce: u64,
    pub timestamp: u64,
    pub worker_id: String,
}

impl ResultReport {
    pub fn new(state: ResultState, found: Found, task: &Task) -> Self {
        Self {
            state,
            score: found.score,
            payload: task.payload.clone(),
            nonce: found.nonce,
            timestamp: found.timestamp,
            worker_id: task.worker_id.clone(),
        }
    }
}

/// Messages sent to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Queue is empty; send a range
    RangeRequest,

    /// A nonce met the share or main threshold
    Result(ResultReport),

    /// Scanning cannot proceed for the current task
    Error { message: String, worker_id: String },
}

impl WorkerMessage {
    /// Convert to the JSON value written on the wire.
    pub fn to_json(&self) -> Value {
        match self {
            WorkerMessage::RangeRequest => Value::String(RANGE_REQUEST.to_string()),
            WorkerMessage::Result(report) => {
                serde_json::to_value(report).unwrap_or_else(|_| Value::Object(Map::new()))
            }
            WorkerMessage::Error { message, worker_id } => json!({
                "state": "error",
                "message": message,
                "workerId": worker_id,
            }),
        }
    }
}
