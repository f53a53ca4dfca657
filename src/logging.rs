use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::opts::DebugSetting;

/// Environment variable that overrides the log filter.
pub const LOG_ENV_VAR: &str = "TRANSCRIPT_LOG";

/// Initialize structured JSON logging.
///
/// Defaults to `info`, or `debug` when the debug flag is set, unless overridden by
/// `TRANSCRIPT_LOG`.
pub fn init(debug: DebugSetting) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(debug.default_directive()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .try_init();
}
