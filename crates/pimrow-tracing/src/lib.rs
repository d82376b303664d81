//! Shared tracing configuration for the pimrow workspace.
//!
//! Binaries, integration tests, and benches install their `tracing`
//! subscriber through this crate so the logging surface stays consistent
//! across the workspace instead of each entry point re-rolling builder
//! logic.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub use tracing::{debug, error, info, trace, warn};

/// Configuration describing how the shared subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Optional tracing directives (e.g. `pimrow_core=debug,info`). When
    /// absent the crate falls back to `RUST_LOG` and finally to
    /// [`TracingConfig::default_directive`].
    pub directives: Option<String>,
    /// Fallback directive used when neither `directives` nor `RUST_LOG`
    /// resolve to a valid filter.
    pub default_directive: String,
    /// Controls ANSI formatting. Disable for CI logs that strip colour codes.
    pub ansi: bool,
    /// Controls whether event targets (module paths) appear in output.
    pub include_targets: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            ansi: true,
            include_targets: false,
        }
    }
}

impl TracingConfig {
    fn env_filter(&self) -> EnvFilter {
        if let Some(directives) = &self.directives {
            if let Ok(filter) = EnvFilter::try_new(directives) {
                return filter;
            }
        }
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directive.clone()))
    }
}

/// Install the shared subscriber, returning an error if one is already set.
pub fn try_init(config: TracingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi)
        .with_target(config.include_targets);
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Install the shared subscriber with default configuration.
///
/// Safe to call from multiple tests in one process; later calls are no-ops.
pub fn init() {
    let _ = try_init(TracingConfig::default());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_info_fallback() {
        let config = TracingConfig::default();
        assert_eq!(config.default_directive, "info");
        assert!(config.directives.is_none());
    }

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
