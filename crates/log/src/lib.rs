//! # Flowmesh Log
//!
//! Thin `tracing-subscriber` bootstrap shared by every binary in the
//! workspace (`flowmesh-server` and any future CLI). Keeps log setup in
//! one place so every deployment gets the same field conventions:
//! `execution_id`, `process_id`, `node_id`, `trigger_type`.

use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable, colorized — the default for local development.
    #[default]
    Pretty,
    /// Newline-delimited JSON — for shipping to a log aggregator.
    Json,
}

/// Logging configuration. `RUST_LOG` (parsed as an [`EnvFilter`]) always
/// takes precedence over `default_level` when set.
#[derive(Debug, Clone)]
pub struct Config {
    pub format: Format,
    pub default_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            format: Format::default(),
            default_level: "info".to_owned(),
        }
    }
}

/// Install the global tracing subscriber. Must be called once, as early
/// as possible in `main`. Returns an error if a subscriber is already
/// installed (e.g. called twice, or from a test harness that already set
/// one up).
pub fn init(config: Config) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_level.clone()));

    let registry = Registry::default().with(filter);

    match config.format {
        Format::Pretty => {
            let layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(true);
            registry.with(layer).try_init()
        }
        Format::Json => {
            let layer = tracing_subscriber::fmt::layer().json().with_target(true);
            registry.with(layer).try_init()
        }
    }
}

/// Install a subscriber suitable for `#[test]` functions: pretty output,
/// `warn` default, and tolerant of repeated calls across test binaries.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
