//! Logging and tracing utilities for demoscope
//!
//! Structured logging goes through the `tracing` crate. Binaries call
//! [`init_default`] or [`init_with_config`] once at startup; the library
//! itself only emits events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Default filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "warn,demoscope=info,demoscope_parsers=info";

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default log level filter (e.g., "info", "debug", "warn")
    pub default_level: String,
    /// Show the target (module path) in log output
    pub show_target: bool,
    /// Show thread IDs in log output
    pub show_thread_ids: bool,
    /// Show source file in log output
    pub show_file: bool,
    /// Show line number in log output
    pub show_line_number: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: DEFAULT_FILTER.to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

impl TracingConfig {
    /// Config whose level follows a `-v` count: 0 = default, 1 = debug, 2+ = trace
    pub fn from_verbosity(verbose: u8) -> Self {
        let default_level = match verbose {
            0 => DEFAULT_FILTER.to_string(),
            1 => "info,demoscope=debug,demoscope_parsers=debug".to_string(),
            _ => "debug,demoscope=trace,demoscope_parsers=trace".to_string(),
        };
        Self {
            default_level,
            show_thread_ids: verbose > 1,
            ..Self::default()
        }
    }
}

/// Initialize the default tracing subscriber
///
/// This should be called once at application startup. Multiple calls are safe
/// and will be ignored.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
///
/// Returns `false` if a subscriber was already installed.
pub fn init_with_config(config: TracingConfig) -> bool {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return false;
    }

    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .is_ok()
}

/// Instrument a parsing operation with timing
pub fn instrument_parse<T, F>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = tracing::info_span!("parse", parser = %name);
    let _guard = span.enter();

    let start = Instant::now();
    let result = f();
    let duration = start.elapsed();

    tracing::debug!(duration_ms = %duration.as_millis(), "Parse operation complete");

    result
}

/// Log progress every 1000 frames and at the end
pub fn log_progress(current: usize, total: usize) {
    if total == 0 {
        return;
    }
    if current % 1000 == 0 || current == total {
        let percent = (current as f64 / total as f64 * 100.0) as u32;
        tracing::debug!(current = %current, total = %total, percent = %percent, "Progress");
    }
}
