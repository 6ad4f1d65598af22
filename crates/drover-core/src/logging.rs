//! Tracing setup for the control plane.
//!
//! Verbosity is a small ladder (error through trace), output goes to
//! stderr or an append-only file, and either human text or JSON framing
//! can be selected. `RUST_LOG` overrides the computed filter.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

fn build_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level_for(verbosity);
        EnvFilter::new(format!(
            "drover_core={level},drover_users={level},drover_terminal={level}"
        ))
    })
}

fn init_error(err: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::other(err.to_string()))
}

/// Initialize the logging system.
///
/// `verbosity` maps 0..=4 onto error..=trace. With `log_file` set, output
/// is appended there with ANSI colors disabled; otherwise it goes to
/// stderr. Source locations are included from debug verbosity up.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>, format: LogFormat) -> Result<()> {
    let filter = build_filter(verbosity);
    let registry = tracing_subscriber::registry().with(filter);
    let with_locations = verbosity >= 3;

    match (log_file, format) {
        (None, LogFormat::Text) => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(with_locations)
                    .with_line_number(with_locations),
            )
            .try_init()
            .map_err(init_error),
        (None, LogFormat::Json) => registry
            .with(fmt::layer().json())
            .try_init()
            .map_err(init_error),
        (Some(path), format) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            match format {
                LogFormat::Text => registry
                    .with(
                        fmt::layer()
                            .with_writer(file)
                            .with_ansi(false)
                            .with_target(true)
                            .with_file(with_locations)
                            .with_line_number(with_locations),
                    )
                    .try_init()
                    .map_err(init_error),
                LogFormat::Json => registry
                    .with(fmt::layer().json().with_writer(file))
                    .try_init()
                    .map_err(init_error),
            }
        }
    }
}

/// Logging defaults for tests: info-level text on stderr, double
/// initialization tolerated.
pub fn init_test_logging() {
    let _ = init_logging(2, None, LogFormat::Text);
}
