//! Worker configuration.
//!
//! Parses environment variables to configure the coordinator connection and
//! the throttling governor. Every variable is optional; unset or unparseable
//! values fall back to the defaults.

use std::env;
use std::time::Duration;

use crate::coordinator::Endpoint;
use crate::executor::ThrottleConfig;
use crate::tracing::prelude::*;

/// Worker configuration parsed from environment variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkerConfig {
    /// Where the coordinator lives.
    pub endpoint: Endpoint,

    pub throttle: ThrottleConfig,

    /// Start with the throttling bypass enabled.
    pub turbo: bool,
}

impl WorkerConfig {
    /// Parse configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `NONCE_WORKER_COORDINATOR`: `host:port` to connect to over TCP
    ///   (default: newline-delimited JSON on stdin/stdout)
    /// - `NONCE_WORKER_MEASURE_MS`: measurement window in ms (default: 2000)
    /// - `NONCE_WORKER_COOLDOWN_MS`: cooldown length in ms (default: 1000)
    /// - `NONCE_WORKER_THRESHOLD`: fraction of baseline below which a cooldown
    ///   is inserted (default: 0.7, must be in (0, 1])
    /// - `NONCE_WORKER_TURBO`: `1`/`true` to start in turbo mode
    pub fn from_env() -> Self {
        let defaults = ThrottleConfig::default();

        let endpoint = match env::var("NONCE_WORKER_COORDINATOR") {
            Ok(addr) if !addr.trim().is_empty() => Endpoint::Tcp(addr.trim().to_string()),
            _ => Endpoint::Stdio,
        };

        let measure_interval = parse_millis("NONCE_WORKER_MEASURE_MS")
            .filter(|d| !d.is_zero())
            .unwrap_or(defaults.measure_interval);

        let cooldown = parse_millis("NONCE_WORKER_COOLDOWN_MS").unwrap_or(defaults.cooldown);

        let hash_threshold = parse::<f64>("NONCE_WORKER_THRESHOLD")
            .filter(|t| *t > 0.0 && *t <= 1.0)
            .unwrap_or(defaults.hash_threshold);

        let turbo = env::var("NONCE_WORKER_TURBO")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Self {
            endpoint,
            throttle: ThrottleConfig {
                measure_interval,
                cooldown,
                hash_threshold,
            },
            turbo,
        }
    }
}

fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(var, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

fn parse_millis(var: &str) -> Option<Duration> {
    parse::<u64>(var).map(Duration::from_millis)
}
