//! Core types for nonce-worker.
//!
//! This module provides a unified location for the data model shared by the
//! executor and the coordinator protocol: the task being worked on, the nonce
//! ranges handed out by the coordinator, and the outcome of scoring a nonce.

use std::fmt;
use std::ops::Range;

use serde::Deserialize;
use serde_json::Value;

use crate::u256::U256;

/// Work definition supplied by the coordinator.
///
/// Immutable once received; a new definition replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Position of the unit being searched for
    pub index: u64,

    /// Reference to the prior state this task builds on
    pub previous_hash: String,

    /// Opaque payload, echoed back in result reports
    #[serde(alias = "data")]
    pub payload: Value,

    /// Scores strictly below this are valid results
    pub main_factor: U256,

    /// Scores strictly below this (and not valid) are shares
    pub share_factor: U256,

    /// Identity reported with every result
    #[serde(alias = "minerId")]
    pub worker_id: String,
}

impl Task {
    /// Payload as it appears in the scoring preimage.
    ///
    /// Strings are used verbatim; any other JSON value uses its compact JSON
    /// text.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Half-open interval `[start, end)` of candidate nonces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceRange {
    pub start: u64,
    pub end: u64,
}

impl NonceRange {
    /// Create a range, or `None` if `start > end`.
    pub fn new(start: u64, end: u64) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Number of nonces in the range.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Candidate nonces in ascending order.
    pub fn nonces(&self) -> Range<u64> {
        self.start..self.end
    }
}

impl fmt::Display for NonceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A scored nonce that met one of the task's thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// Digest as lowercase hex
    pub score: String,
    pub nonce: u64,
    /// Capture time, milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// Classification of a single scored nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Below the main factor; ends the search for this task
    Valid(Found),

    /// Below the share factor; reported, scanning continues
    Share(Found),

    /// Neither threshold met, or the digest was unusable
    NotValid,
}

impl Outcome {
    /// Classify a digest value against a task's thresholds.
    ///
    /// Factors are compared in order, main first, so a task whose share
    /// factor is not above its main factor never yields shares.
    pub fn classify(value: U256, task: &Task, found: Found) -> Self {
        if value < task.main_factor {
            Outcome::Valid(found)
        } else if value < task.share_factor {
            Outcome::Share(found)
        } else {
            Outcome::NotValid
        }
    }
}

/// Hashrate measurement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HashRate(pub u64); // hashes per second

impl HashRate {
    /// Create from a rate in hashes per second.
    pub fn from_per_second(rate: f64) -> Self {
        Self(rate.max(0.0) as u64)
    }
}

impl fmt::Display for HashRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rate = self.0 as f64;
        if self.0 >= 1_000_000_000 {
            write!(f, "{:.2} GH/s", rate / 1_000_000_000.0)
        } else if self.0 >= 1_000_000 {
            write!(f, "{:.2} MH/s", rate / 1_000_000.0)
        } else if self.0 >= 1_000 {
            write!(f, "{:.2} kH/s", rate / 1_000.0)
        } else {
            write!(f, "{} H/s", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::task_with_factors;
    use super::*;
    use serde_json::json;

    fn found(nonce: u64) -> Found {
        Found {
            score: String::new(),
            nonce,
            timestamp: 0,
        }
    }

    #[test]
    fn test_task_accepts_legacy_field_names() {
        let task: Task = serde_json::from_value(json!({
            "index": 7,
            "previousHash": "abc",
            "data": {"tx": [1, 2]},
            "mainFactor": "0x10",
            "shareFactor": 4096,
            "minerId": "rig-3",
        }))
        .unwrap();

        assert_eq!(task.index, 7);
        assert_eq!(task.main_factor, U256::from(16));
        assert_eq!(task.share_factor, U256::from(4096));
        assert_eq!(task.worker_id, "rig-3");
        assert_eq!(task.payload_text(), r#"{"tx":[1,2]}"#);
    }

    #[test]
    fn test_task_missing_factor_rejected() {
        let result = serde_json::from_value::<Task>(json!({
            "index": 7,
            "previousHash": "abc",
            "payload": "p",
            "shareFactor": 4096,
            "workerId": "rig-3",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_classify_boundaries() {
        let task = task_with_factors(10, 1000);

        assert!(matches!(
            Outcome::classify(U256::from(9), &task, found(0)),
            Outcome::Valid(_)
        ));
        assert!(matches!(
            Outcome::classify(U256::from(10), &task, found(0)),
            Outcome::Share(_)
        ));
        assert!(matches!(
            Outcome::classify(U256::from(999), &task, found(0)),
            Outcome::Share(_)
        ));
        assert_eq!(
            Outcome::classify(U256::from(1000), &task, found(0)),
            Outcome::NotValid
        );
    }

    #[test]
    fn test_classify_tolerates_inverted_factors() {
        let task = task_with_factors(1000, 10);

        assert!(matches!(
            Outcome::classify(U256::from(500), &task, found(0)),
            Outcome::Valid(_)
        ));
        assert_eq!(
            Outcome::classify(U256::from(1000), &task, found(0)),
            Outcome::NotValid
        );
    }

    #[test]
    fn test_nonce_range() {
        assert!(NonceRange::new(5, 4).is_none());

        let empty = NonceRange::new(3, 3).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.nonces().count(), 0);

        let range = NonceRange::new(2, 6).unwrap();
        assert_eq!(range.len(), 4);
        assert_eq!(range.nonces().collect::<Vec<_>>(), vec![2, 3, 4, 5]);
        assert_eq!(range.to_string(), "[2, 6)");
    }

    #[test]
    fn test_hashrate_display() {
        assert_eq!(HashRate(950).to_string(), "950 H/s");
        assert_eq!(HashRate(12_500).to_string(), "12.50 kH/s");
        assert_eq!(HashRate::from_per_second(5_000_000.0).to_string(), "5.00 MH/s");
        assert_eq!(HashRate::from_per_second(-1.0), HashRate(0));
    }
}
