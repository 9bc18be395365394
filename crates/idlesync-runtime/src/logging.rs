//! Structured logging setup for hosts embedding the engine
//!
//! The engine crates only emit `tracing` events. A host calls
//! [`init_logging`] once at startup to install a subscriber; `RUST_LOG`
//! overrides the verbosity-derived filter.

use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use idlesync_core::{SyncError, SyncResult};

const CRATES: [&str; 4] = [
    "idlesync_core",
    "idlesync_time",
    "idlesync_state",
    "idlesync_runtime",
];

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(SyncError::Logging(format!("unknown log format: {other}"))),
        }
    }
}

/// 0=error, 1=warn, 2=info, 3=debug, 4+=trace
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Filter directives covering every engine crate at one level
pub fn filter_directives(verbosity: u8) -> String {
    let level = level_for(verbosity);
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber, writing to stderr
///
/// Fails if a subscriber is already installed.
pub fn init_logging(verbosity: u8, format: LogFormat) -> SyncResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(verbosity)));
    let detailed = verbosity >= 3;

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_file(detailed)
                    .with_line_number(detailed),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| SyncError::Logging(e.to_string()))
}

/// Best-effort setup for tests; a second call is a no-op
pub fn init_test_logging() {
    let _ = init_logging(2, LogFormat::Text);
}
