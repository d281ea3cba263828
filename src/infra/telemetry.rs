use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the crate emits. Safe to call more
/// than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "scriptorium_cache_lookup_total",
            Unit::Count,
            "Entry-list cache lookups, labelled by fresh, stale or miss outcome."
        );
        describe_counter!(
            "scriptorium_cache_evict_total",
            Unit::Count,
            "Entry lists evicted from the cache due to capacity."
        );
        describe_counter!(
            "scriptorium_cache_refresh_total",
            Unit::Count,
            "Background refreshes, labelled by result."
        );
        describe_histogram!(
            "scriptorium_cache_refresh_ms",
            Unit::Milliseconds,
            "Background refresh latency in milliseconds."
        );
        describe_counter!(
            "scriptorium_plugin_failures_total",
            Unit::Count,
            "Plugin chain step failures, labelled by resolve, transform or cleanup stage."
        );
    });
}
