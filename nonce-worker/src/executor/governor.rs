//! Throttling governor.
//!
//! Watches scoring throughput and inserts a cooldown when it sags well below
//! the rate seen in the first measurement window. A sustained drop usually
//! means thermal throttling or contention; backing off briefly lets the
//! hardware recover instead of grinding at a degraded rate.
//!
//! # State machine
//!
//! Every scoring operation calls [`ThrottleGovernor::pace`]:
//!
//! 1. Count the operation.
//! 2. If `measure_interval` has elapsed since the window opened, compute the
//!    rate over the window. The first window's rate becomes the baseline.
//!    Later windows below `hash_threshold` × baseline mark a cooldown as
//!    pending. Either way the window restarts.
//! 3. If a cooldown is pending, sleep for `cooldown` and clear it.
//!
//! The baseline is taken once and never recalibrated. Time the executor
//! spends idle (awaiting a task or a range) is excluded by restarting the
//! window when scanning resumes.
//!
//! Turbo mode bypasses all of the above: no counting, no rate computation,
//! no sleeping.

use std::time::Duration;

use tokio::time::Instant;

use crate::tracing::prelude::*;
use crate::types::HashRate;

/// Default length of a measurement window.
pub const MEASURE_INTERVAL: Duration = Duration::from_millis(2000);

/// Default cooldown inserted on degradation.
pub const COOLDOWN_TIME: Duration = Duration::from_millis(1000);

/// Default fraction of the baseline below which a cooldown is triggered.
pub const HASH_THRESHOLD: f64 = 0.7;

/// Governor tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleConfig {
    pub measure_interval: Duration,
    pub cooldown: Duration,
    pub hash_threshold: f64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            measure_interval: MEASURE_INTERVAL,
            cooldown: COOLDOWN_TIME,
            hash_threshold: HASH_THRESHOLD,
        }
    }
}

/// Mutable governor state.
#[derive(Debug, Clone, PartialEq)]
pub struct ThrottleState {
    /// Scoring operations since `window_start`
    pub samples_since_measurement: u64,
    pub window_start: Instant,
    /// Rate from the first full window, hashes per second
    pub baseline_rate: Option<f64>,
    pub cooldown_pending: bool,
    pub turbo_enabled: bool,
}

/// Result of the measurement step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Turbo is on; nothing was counted
    Bypassed,

    /// Counted; window still open
    Counting,

    /// Window closed and its rate became the baseline
    Baseline(f64),

    /// Window closed and its rate was compared against the baseline
    Compared { rate: f64, ratio: f64 },
}

/// Throughput governor for one executor.
#[derive(Debug)]
pub struct ThrottleGovernor {
    config: ThrottleConfig,
    state: ThrottleState,
}

impl ThrottleGovernor {
    pub fn new(config: ThrottleConfig, turbo_enabled: bool) -> Self {
        Self {
            config,
            state: ThrottleState {
                samples_since_measurement: 0,
                window_start: Instant::now(),
                baseline_rate: None,
                cooldown_pending: false,
                turbo_enabled,
            },
        }
    }

    pub fn state(&self) -> &ThrottleState {
        &self.state
    }

    /// Toggle the turbo bypass; takes effect on the next operation.
    ///
    /// Leaving turbo restarts the measurement window so time spent in turbo
    /// isn't counted against the rate.
    pub fn set_turbo(&mut self, enabled: bool, now: Instant) {
        if self.state.turbo_enabled == enabled {
            return;
        }
        info!(enabled, "Turbo mode toggled");
        self.state.turbo_enabled = enabled;
        if !enabled {
            self.restart_window(now);
        }
    }

    /// Discard the open window and start a new one at `now`.
    ///
    /// Called when scanning resumes after an idle suspension so waiting time
    /// never reads as lost throughput. The baseline and any pending cooldown
    /// are kept.
    pub fn restart_window(&mut self, now: Instant) {
        self.state.samples_since_measurement = 0;
        self.state.window_start = now;
    }

    /// Measurement step for one scoring operation at time `now`.
    pub fn measure(&mut self, now: Instant) -> Measurement {
        if self.state.turbo_enabled {
            return Measurement::Bypassed;
        }

        self.state.samples_since_measurement += 1;

        let elapsed = now.saturating_duration_since(self.state.window_start);
        if elapsed < self.config.measure_interval || elapsed.is_zero() {
            return Measurement::Counting;
        }

        let rate = self.state.samples_since_measurement as f64 / elapsed.as_secs_f64();
        trace!(
            hashrate = %HashRate::from_per_second(rate),
            samples = self.state.samples_since_measurement,
            "Measurement window closed"
        );

        let measurement = match self.state.baseline_rate {
            None => {
                debug!(baseline = %HashRate::from_per_second(rate), "Baseline hashrate set");
                self.state.baseline_rate = Some(rate);
                Measurement::Baseline(rate)
            }
            Some(baseline) => {
                let ratio = rate / baseline;
                if ratio < self.config.hash_threshold {
                    debug!(
                        hashrate = %HashRate::from_per_second(rate),
                        baseline = %HashRate::from_per_second(baseline),
                        ratio,
                        "Throughput degraded, cooldown pending"
                    );
                    self.state.cooldown_pending = true;
                }
                Measurement::Compared { rate, ratio }
            }
        };

        self.state.samples_since_measurement = 0;
        self.state.window_start = now;
        measurement
    }

    /// Run the governor for one scoring operation.
    ///
    /// Returns `true` if the call slept for a cooldown.
    pub async fn pace(&mut self) -> bool {
        if self.measure(Instant::now()) == Measurement::Bypassed {
            return false;
        }
        if !self.state.cooldown_pending {
            return false;
        }

        tokio::time::sleep(self.config.cooldown).await;
        self.state.cooldown_pending = false;
        true
    }
}
