//! Range-scanning executor.
//!
//! The executor is a single async task that owns every piece of scan state:
//! the current task, the queue of ranges not yet started, the preemption flag,
//! and the throttling governor. Coordinator messages arrive on an inbox
//! channel and are merged into that state only at the loop's poll points, so
//! nothing outside the loop ever races the per-nonce checks.
//!
//! # Loop
//!
//! ```text
//!          +--------- halted (valid found / backend down) <---------+
//!          |                     |  new task                         |
//!          v                     v                                   |
//!   wait for task --> replacement path --> next range --> scan ------+
//!                         ^                    |  queue empty   |
//!                         |                    v                |
//!                         +------------ request range <---------+
//!                           task replaced      (exhausted / preempted)
//! ```
//!
//! Before every nonce the loop drains the inbox and checks the `updated` flag.
//! A set flag abandons the current range, flushes the queue, and goes back to
//! the coordinator for fresh work against the new task. Outcomes from nonces
//! scored before the flag was seen stand.
//!
//! A valid result ends the search for the task: it is reported and the
//! executor halts until the coordinator sends a new task.

mod governor;
mod queue;

pub use governor::{
    Measurement, ThrottleConfig, ThrottleGovernor, ThrottleState, COOLDOWN_TIME, HASH_THRESHOLD,
    MEASURE_INTERVAL,
};
pub use queue::RangeQueue;

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::{
    coordinator::{CoordinatorMessage, ResultReport, ResultState, WorkerMessage},
    scoring::{Scorer, ScoringError, ScoringInput},
    tracing::prelude::*,
    types::{Found, NonceRange, Outcome, Task},
    u256::{ParseU256Error, U256},
};

/// Nonces scanned between voluntary yields to the runtime.
const YIELD_INTERVAL: u64 = 1024;

/// Error types for executor operations.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Outbox closed; results can no longer be delivered")]
    OutboxClosed,
}

/// Counters kept over the executor's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Nonces scored
    pub hashes: u64,
    pub shares_found: u64,
    pub valid_found: u64,
    /// Scans abandoned because the task was replaced
    pub preemptions: u64,
    /// Cooldowns inserted by the governor
    pub cooldowns: u64,
    /// Digests that could not be read as a number
    pub anomalies: u64,
}

/// How a range scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanEnd {
    /// Every nonce scored, nothing valid
    Exhausted,

    /// Task replaced mid-scan; remainder discarded
    Preempted,

    /// Valid result reported
    Found,

    /// Scoring backend failed; error reported
    BackendFailed,

    /// Coordinator gone
    Disconnected,
}

/// Work-unit executor for one coordinator.
pub struct Executor<S: Scorer> {
    /// Human-readable name for logging
    name: String,

    scorer: S,

    inbox: mpsc::Receiver<CoordinatorMessage>,
    outbox: mpsc::Sender<WorkerMessage>,

    /// Current task, `None` until the first definition arrives
    task: Option<Arc<Task>>,

    /// Set when a task replaces an existing one; consumed by the replacement
    /// path
    updated: bool,

    /// No scanning until the next task (valid found or backend failed)
    halted: bool,

    queue: RangeQueue,

    governor: ThrottleGovernor,

    stats: ExecutorStats,
}

impl<S: Scorer> Executor<S> {
    pub fn new(
        name: String,
        scorer: S,
        throttle: ThrottleConfig,
        turbo_enabled: bool,
        inbox: mpsc::Receiver<CoordinatorMessage>,
        outbox: mpsc::Sender<WorkerMessage>,
    ) -> Self {
        Self {
            name,
            scorer,
            inbox,
            outbox,
            task: None,
            updated: false,
            halted: false,
            queue: RangeQueue::new(),
            governor: ThrottleGovernor::new(throttle, turbo_enabled),
            stats: ExecutorStats::default(),
        }
    }

    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    /// Run until the coordinator goes away.
    ///
    /// Returns `Ok` when the inbox closes. Fails only if results can no
    /// longer be delivered.
    pub async fn run(mut self) -> Result<ExecutorStats, ExecutorError> {
        info!(
            executor = %self.name,
            scorer = self.scorer.name(),
            "Executor started"
        );

        loop {
            let Some(task) = self.task.clone().filter(|_| !self.halted) else {
                let Some(message) = self.inbox.recv().await else {
                    break;
                };
                self.absorb(message);
                // Idle time is not measured
                self.governor.restart_window(Instant::now());
                continue;
            };

            // A replacement that landed while the last range finished runs
            // before any request goes out
            if !self.drain_inbox() {
                break;
            }
            if self.updated {
                self.apply_replacement();
            }

            let range = match self.queue.pop() {
                Some(range) => range,
                None => match self.request_range().await? {
                    Some(range) => {
                        self.governor.restart_window(Instant::now());
                        range
                    }
                    None => break,
                },
            };

            // Draining or awaiting the range may have installed a newer task
            let task = self.task.clone().unwrap_or(task);

            match self.scan(task, range).await? {
                ScanEnd::Exhausted | ScanEnd::Preempted => {}
                ScanEnd::Found | ScanEnd::BackendFailed => self.halted = true,
                ScanEnd::Disconnected => break,
            }
        }

        info!(
            executor = %self.name,
            hashes = self.stats.hashes,
            shares = self.stats.shares_found,
            valid = self.stats.valid_found,
            "Coordinator gone, executor stopping"
        );
        Ok(self.stats)
    }

    /// Merge one inbound message into loop state.
    fn absorb(&mut self, message: CoordinatorMessage) {
        match message {
            CoordinatorMessage::Turbo(enabled) => self.governor.set_turbo(enabled, Instant::now()),
            CoordinatorMessage::Range(range) => {
                trace!(executor = %self.name, %range, "Range queued");
                self.queue.push(range);
            }
            CoordinatorMessage::Task(task) => self.install_task(*task),
        }
    }

    fn install_task(&mut self, task: Task) {
        if self.task.is_some() {
            info!(executor = %self.name, index = task.index, "Task replaced");
            self.updated = true;
        } else {
            info!(executor = %self.name, index = task.index, "Task received");
        }
        self.task = Some(Arc::new(task));
        self.halted = false;
    }

    /// Drain every message already delivered, without waiting.
    ///
    /// Returns `false` once the coordinator has gone away.
    fn drain_inbox(&mut self) -> bool {
        loop {
            match self.inbox.try_recv() {
                Ok(message) => self.absorb(message),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Discard all work belonging to the replaced task.
    fn apply_replacement(&mut self) {
        let discarded = self.queue.clear();
        self.updated = false;
        debug!(
            executor = %self.name,
            discarded_ranges = discarded,
            "Work flushed for new task"
        );
    }

    /// Ask the coordinator for a range and wait for one.
    ///
    /// A task replacement while waiting runs the replacement path and asks
    /// again, so the range that resumes the loop is requested under the
    /// current task. Returns `None` if the coordinator goes away.
    async fn request_range(&mut self) -> Result<Option<NonceRange>, ExecutorError> {
        debug_assert!(self.queue.is_empty(), "range requested with work queued");
        self.send(WorkerMessage::RangeRequest).await?;
        debug!(executor = %self.name, "Range requested");

        loop {
            let Some(message) = self.inbox.recv().await else {
                return Ok(None);
            };
            match message {
                CoordinatorMessage::Range(range) => {
                    debug!(executor = %self.name, %range, "Range received");
                    return Ok(Some(range));
                }
                CoordinatorMessage::Task(task) => {
                    self.install_task(*task);
                    self.apply_replacement();
                    self.send(WorkerMessage::RangeRequest).await?;
                    debug!(executor = %self.name, "Range re-requested for new task");
                }
                other => self.absorb(other),
            }
        }
    }

    /// Scan one range against the current task.
    async fn scan(
        &mut self,
        task: Arc<Task>,
        range: NonceRange,
    ) -> Result<ScanEnd, ExecutorError> {
        trace!(executor = %self.name, %range, "Scanning range");

        for nonce in range.nonces() {
            if !self.drain_inbox() {
                return Ok(ScanEnd::Disconnected);
            }
            if self.updated {
                return Ok(self.preempted(range, nonce));
            }

            if self.governor.pace().await {
                self.stats.cooldowns += 1;
                // Messages that landed during the cooldown are honored before
                // the next score
                if !self.drain_inbox() {
                    return Ok(ScanEnd::Disconnected);
                }
                if self.updated {
                    return Ok(self.preempted(range, nonce));
                }
            }

            let timestamp = now_millis();
            let input = ScoringInput::new(&task, nonce, timestamp);
            let digest = match self.scorer.score(&input).await {
                Ok(digest) => digest,
                Err(ScoringError::Unavailable(reason)) => {
                    error!(executor = %self.name, %reason, "Scoring backend unavailable");
                    self.send(WorkerMessage::Error {
                        message: format!("scoring backend unavailable: {}", reason),
                        worker_id: task.worker_id.clone(),
                    })
                    .await?;
                    return Ok(ScanEnd::BackendFailed);
                }
            };
            self.stats.hashes += 1;

            match self.classify(&task, &digest, nonce, timestamp) {
                Outcome::Valid(found) => {
                    self.stats.valid_found += 1;
                    info!(executor = %self.name, nonce, score = %found.score, "Valid result found");
                    self.report(ResultState::Valid, found, &task).await?;
                    self.log_stats();
                    return Ok(ScanEnd::Found);
                }
                Outcome::Share(found) => {
                    self.stats.shares_found += 1;
                    debug!(executor = %self.name, nonce, "Share found");
                    self.report(ResultState::Share, found, &task).await?;
                }
                Outcome::NotValid => {}
            }

            if (nonce - range.start + 1) % YIELD_INTERVAL == 0 {
                tokio::task::yield_now().await;
            }
        }

        trace!(executor = %self.name, %range, "Range exhausted");
        self.log_stats();
        Ok(ScanEnd::Exhausted)
    }

    fn preempted(&mut self, range: NonceRange, nonce: u64) -> ScanEnd {
        self.stats.preemptions += 1;
        debug!(
            executor = %self.name,
            %range,
            abandoned = range.end - nonce,
            "Scan preempted by task replacement"
        );
        ScanEnd::Preempted
    }

    /// Read a digest as a number and classify it against the task.
    ///
    /// A digest that is empty or not hex is an anomaly, not an error: it's
    /// logged and treated as not valid.
    fn classify(&mut self, task: &Task, digest: &str, nonce: u64, timestamp: u64) -> Outcome {
        let value = match U256::from_hex(digest) {
            Ok(value) => value,
            Err(e) => {
                // Too large for 256 bits still means above every factor
                if e != ParseU256Error::Overflow {
                    self.stats.anomalies += 1;
                    warn!(executor = %self.name, nonce, %digest, error = %e, "Malformed digest");
                }
                return Outcome::NotValid;
            }
        };

        let found = Found {
            score: digest.to_ascii_lowercase(),
            nonce,
            timestamp,
        };
        Outcome::classify(value, task, found)
    }

    async fn report(
        &mut self,
        state: ResultState,
        found: Found,
        task: &Task,
    ) -> Result<(), ExecutorError> {
        self.send(WorkerMessage::Result(ResultReport::new(state, found, task)))
            .await
    }

    async fn send(&self, message: WorkerMessage) -> Result<(), ExecutorError> {
        self.outbox
            .send(message)
            .await
            .map_err(|_| ExecutorError::OutboxClosed)
    }

    fn log_stats(&self) {
        debug!(
            executor = %self.name,
            hashes = self.stats.hashes,
            shares = self.stats.shares_found,
            valid = self.stats.valid_found,
            preemptions = self.stats.preemptions,
            cooldowns = self.stats.cooldowns,
            anomalies = self.stats.anomalies,
            queued = self.queue.len(),
            "Executor stats"
        );
    }
}

/// Wall-clock capture time in milliseconds since the Unix epoch.
fn now_millis() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    u64::try_from(nanos / 1_000_000).unwrap_or(0)
}
