//! Scoring backends.
//!
//! A scorer maps a task, a candidate nonce, and a capture timestamp to a
//! fixed-length digest. The executor reads the digest as a big unsigned
//! integer and compares it against the task's factors; how the digest is
//! produced is entirely up to the backend.
//!
//! Backends return the digest as hex text rather than bytes. Output that is
//! empty or not hex is an anomaly the executor tolerates (it classifies the
//! nonce as not valid and moves on), so a backend doesn't need to be
//! infallible to be usable.

use async_trait::async_trait;
use bitcoin::hashes::{sha256d, Hash};

use crate::types::Task;

/// Errors a scoring backend can report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    /// The backend cannot run at all (missing device, failed init).
    #[error("scoring backend unavailable: {0}")]
    Unavailable(String),
}

/// Everything a backend needs to score one nonce.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringInput {
    pub index: u64,
    pub previous_hash: String,
    pub payload: String,
    pub nonce: u64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub worker_id: String,
}

impl ScoringInput {
    pub fn new(task: &Task, nonce: u64, timestamp: u64) -> Self {
        Self {
            index: task.index,
            previous_hash: task.previous_hash.clone(),
            payload: task.payload_text(),
            nonce,
            timestamp,
            worker_id: task.worker_id.clone(),
        }
    }

    /// Text the digest is computed over.
    pub fn preimage(&self) -> String {
        format!(
            "{}-{}-{}-{}-{}-{}",
            self.index,
            self.previous_hash,
            self.payload,
            self.nonce,
            self.timestamp,
            self.worker_id
        )
    }
}

/// A deterministic scoring function.
///
/// Identical inputs must produce identical digests. Implementations may do
/// their work elsewhere (a device, a blocking pool) and await it; the executor
/// polls for task replacement between calls, never during one.
#[async_trait]
pub trait Scorer: Send {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Score one input, returning the digest as hex.
    async fn score(&mut self, input: &ScoringInput) -> Result<String, ScoringError>;
}

/// Default backend: double SHA-256 over the preimage.
#[derive(Debug, Default, Clone)]
pub struct DigestScorer;

impl DigestScorer {
    pub fn digest(input: &ScoringInput) -> [u8; 32] {
        sha256d::Hash::hash(input.preimage().as_bytes()).to_byte_array()
    }
}

#[async_trait]
impl Scorer for DigestScorer {
    fn name(&self) -> &str {
        "sha256d"
    }

    async fn score(&mut self, input: &ScoringInput) -> Result<String, ScoringError> {
        Ok(hex::encode(Self::digest(input)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::task_with_factors;
    use crate::u256::U256;

    #[test]
    fn test_preimage_layout() {
        let task = task_with_factors(10, 1000);
        let input = ScoringInput::new(&task, 42, 1_700_000_000_123);

        assert_eq!(
            input.preimage(),
            "1-00ab-payload-42-1700000000123-worker-1"
        );
    }

    #[tokio::test]
    async fn test_digest_scorer_is_deterministic() {
        let task = task_with_factors(10, 1000);
        let mut scorer = DigestScorer;

        let a = scorer.score(&ScoringInput::new(&task, 7, 1000)).await.unwrap();
        let b = scorer.score(&ScoringInput::new(&task, 7, 1000)).await.unwrap();
        let c = scorer.score(&ScoringInput::new(&task, 8, 1000)).await.unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(U256::from_hex(&a).is_ok());
    }

    #[tokio::test]
    async fn test_digest_depends_on_timestamp() {
        let task = task_with_factors(10, 1000);
        let mut scorer = DigestScorer;

        let early = scorer.score(&ScoringInput::new(&task, 7, 1000)).await.unwrap();
        let late = scorer.score(&ScoringInput::new(&task, 7, 1001)).await.unwrap();

        assert_ne!(early, late);
    }
}
