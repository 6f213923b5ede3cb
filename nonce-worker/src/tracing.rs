//! Tracing setup for the worker.
//!
//! Call [`init_journald_or_stderr`] once at startup. Everything else pulls the
//! logging macros in with `use crate::tracing::prelude::*`.
//!
//! Logs never go to stdout: in stdio mode stdout carries the coordinator
//! protocol, and a stray log line there would be read as a message.

use std::env;
use std::fmt::Write as _;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// Under systemd (`JOURNAL_STREAM` set) log to journald; otherwise, or if the
/// journal can't be reached, log to stderr.
pub fn init_journald_or_stderr() {
    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => tracing_subscriber::registry().with(layer).init(),
            Err(e) => {
                use_stderr();
                error!(error = %e, "Failed to initialize journald logging, using stderr.");
            }
        }
    } else {
        use_stderr();
    }
}

// Filter by RUST_LOG, defaulting to INFO.
fn use_stderr() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(LocalTimer)
                .event_format(LineFormatter),
        )
        .init();
}

/// One line per event: time, colored level, short target, message, then
/// `key=value` fields.
struct LineFormatter;

#[derive(Default)]
struct FieldCollector {
    message: String,
    fields: String,
}

impl tracing::field::Visit for FieldCollector {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl<S, N> tracing_subscriber::fmt::FormatEvent<S, N> for LineFormatter
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> tracing_subscriber::fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &tracing_subscriber::fmt::FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;

        let (color, level) = match *event.metadata().level() {
            tracing::Level::ERROR => ("\x1b[31m", "ERROR"),
            tracing::Level::WARN => ("\x1b[33m", "WARN "),
            tracing::Level::INFO => ("\x1b[32m", "INFO "),
            tracing::Level::DEBUG => ("\x1b[34m", "DEBUG"),
            tracing::Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        if writer.has_ansi_escapes() {
            write!(writer, " {}{}\x1b[0m ", color, level)?;
        } else {
            write!(writer, " {} ", level)?;
        }

        write!(writer, "{}: {}", short_target(event.metadata().target()), visitor.message)?;

        if !visitor.fields.is_empty() {
            if writer.has_ansi_escapes() {
                write!(writer, "\x1b[90m{}\x1b[0m", visitor.fields)?;
            } else {
                write!(writer, "{}", visitor.fields)?;
            }
        }

        writeln!(writer)
    }
}

/// Our own modules lose the crate prefix; dependencies keep full paths.
fn short_target(target: &str) -> &str {
    target.strip_prefix("nonce_worker::").unwrap_or(target)
}

// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", formatted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_target_strips_own_prefix_only() {
        assert_eq!(short_target("nonce_worker::executor"), "executor");
        assert_eq!(short_target("nonce_worker::coordinator::link"), "coordinator::link");
        assert_eq!(short_target("tokio_util::codec"), "tokio_util::codec");
    }
}
