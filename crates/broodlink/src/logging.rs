//! Stderr diagnostics for the broodlink CLI.
//!
//! Log output goes to stderr so the replay tables on stdout stay clean for
//! piping. The library crates emit through `tracing`; the CLI decides the
//! sink, format and verbosity here.

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;

/// Diagnostic output format.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Compact single-line human-readable output.
    Text,
    /// One JSON object per event, fields flattened, for log collectors.
    Json,
}

/// Minimum severity to emit.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the process-wide subscriber.
///
/// A second call is a no-op; tests that exercise the CLI entry points may
/// race to initialize.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::from(level))
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.compact().try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().flatten_event(true).try_init();
        }
    }
}
