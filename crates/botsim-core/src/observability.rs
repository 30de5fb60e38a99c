//! Logging setup, mirroring the teacher crate's `observability` module: a small config
//! struct plus an `init()` that wires `tracing-subscriber` with an `EnvFilter`.

use tracing_subscriber::{fmt, EnvFilter};

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Stderr,
    Stdout,
}

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Overrides `RUST_LOG` when set; otherwise the filter comes from the environment,
    /// falling back to `info`.
    pub filter: Option<String>,
    pub target: LogTarget,
    pub with_target: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            filter: None,
            target: LogTarget::Stderr,
            with_target: false,
        }
    }
}

/// Installs the global `tracing` subscriber. Safe to call more than once per process
/// (e.g. in tests) — later calls are ignored rather than panicking.
pub fn init(config: ObservabilityConfig) {
    let env_filter = match config.filter {
        Some(ref directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_target(config.with_target);

    let result = match config.target {
        LogTarget::Stderr => subscriber.with_writer(std::io::stderr).try_init(),
        LogTarget::Stdout => subscriber.with_writer(std::io::stdout).try_init(),
    };

    if let Err(err) = result {
        tracing::debug!("tracing subscriber already initialized: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init(ObservabilityConfig::default());
        init(ObservabilityConfig::default());
    }
}
