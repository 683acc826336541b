// ============================================================================
// PIPESTOCK - TELEMETRY
// ============================================================================
// Module: shared/src/telemetry.rs
// Description: Tracing subscriber initialization from logging settings
// ============================================================================

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;

/// Install the global tracing subscriber. `RUST_LOG` overrides the configured
/// level. Safe to call more than once; later calls are no-ops.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let result = match settings.format.as_str() {
        "json" => builder.json().try_init(),
        "compact" => builder.compact().try_init(),
        _ => builder.pretty().try_init(),
    };

    if let Err(err) = result {
        tracing::debug!("tracing subscriber already installed: {err}");
    }
}
