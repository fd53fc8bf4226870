//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` overrides `default_filter` (e.g. `"agora_orchestrator=debug,info"`).
/// Returns `false` when a global subscriber was already installed, which
/// makes repeated calls from tests harmless.
pub fn init(default_filter: &str, format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init().is_ok(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init().is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_a_noop() {
        let _ = init("info", LogFormat::Pretty);
        assert!(!init("debug", LogFormat::Json));
    }
}
