//! Shared tracing/logging initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Default filter used when neither `RUST_LOG` nor the config sets one.
pub const DEFAULT_FILTER: &str = "warden=info,warden_server=info,warden_core=info";

/// Resolve the effective filter directive.
///
/// `RUST_LOG` wins over the configured filter, which wins over
/// [`DEFAULT_FILTER`].
pub fn resolve_filter(config: &LoggingConfig) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| config.filter.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global tracing subscriber.
///
/// Emits JSON lines when `config.json` is set, otherwise the human-readable
/// format. Fails if the filter does not parse or a subscriber is already
/// installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let directive = resolve_filter(config);
    let env_filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .map_err(|e| Error::Config(format!("Invalid log filter {directive:?}: {e}")))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    installed.map_err(|e| Error::Config(format!("Tracing already initialised: {e}")))
}
