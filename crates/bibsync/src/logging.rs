//! Tracing/log wiring for embedding applications.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

/// Installs a global tracing subscriber with env-filter support and
/// bridges `log` macros into it. Safe to call more than once; later calls
/// are no-ops.
pub fn init() {
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true));
    let _ = tracing::subscriber::set_global_default(subscriber);
}
