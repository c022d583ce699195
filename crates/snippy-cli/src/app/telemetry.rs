//! # Telemetry
//!
//! Console logging is always on: a `tracing-subscriber` fmt layer filtered
//! by `RUST_LOG` (default `info`).
//!
//! ## Feature matrix
//!
//! - `tracing`: library spans and events (retries, fallbacks, breaker
//!   transitions) reach the console through `TracingObserver`.
//! - `metrics`: every library event is also counted as an OpenTelemetry
//!   counter.
//! - `stdout`: exports those counters to stdout every few seconds.
//!
//! ## Example usage
//!
//! ```bash
//! RUST_LOG=debug cargo run --features tracing -- demo
//! cargo run --features metrics,stdout -- short-id --count 1000
//! ```

// Disallow using `stdout` without `metrics`
#[cfg(all(feature = "stdout", not(feature = "metrics")))]
compile_error!("The 'stdout' feature requires 'metrics' to be enabled.");

use snippy::Observer;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Meter},
};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::{Resource, metrics as sdkmetrics};
#[cfg(feature = "metrics")]
use snippy::Event;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

pub struct TelemetryProviders {
    #[cfg(feature = "metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes pending exports. Failures are logged, never returned.
    pub fn shutdown(self) {
        #[cfg(feature = "metrics")]
        {
            if let Err(_e) = self.meter_provider.force_flush() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to flush metrics");
            }
            if let Err(_e) = self.meter_provider.shutdown() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to shut down meter provider");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "metrics")]
    let meter_provider = init_metrics();

    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_writer(std::io::stderr),
        );

    #[cfg(feature = "metrics")]
    {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let scope = InstrumentationScope::builder("snippy")
            .with_version(env!("CARGO_PKG_VERSION"))
            .build();
        init_metric_handles(&opentelemetry::global::meter_with_scope(scope));
    }

    registry.try_init()?;

    Ok(TelemetryProviders {
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

/// The observer every command hands to the library: `tracing` logs and
/// OpenTelemetry counters, whichever are compiled in.
pub fn observer() -> Arc<dyn Observer> {
    #[cfg(all(feature = "tracing", feature = "metrics"))]
    {
        Arc::new((snippy::TracingObserver, MetricsObserver))
    }
    #[cfg(all(feature = "tracing", not(feature = "metrics")))]
    {
        Arc::new(snippy::TracingObserver)
    }
    #[cfg(all(not(feature = "tracing"), feature = "metrics"))]
    {
        Arc::new(MetricsObserver)
    }
    #[cfg(not(any(feature = "tracing", feature = "metrics")))]
    {
        Arc::new(snippy::NoopObserver)
    }
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder()
        .with_resource(Resource::builder().with_service_name("snippy").build());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let reader = sdkmetrics::PeriodicReader::builder(MetricExporter::default())
            .with_interval(std::time::Duration::from_secs(5))
            .build();
        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "metrics")]
static RETRIES: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static EXHAUSTIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static FALLBACKS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static BREAKER_TRANSITIONS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static COUNTER_CLAMPS: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = RETRIES.set(
        meter
            .u64_counter("retries")
            .with_description("Retries scheduled, by policy")
            .build(),
    );
    let _ = EXHAUSTIONS.set(
        meter
            .u64_counter("retries_exhausted")
            .with_description("Policies that ran out of attempts")
            .build(),
    );
    let _ = FALLBACKS.set(
        meter
            .u64_counter("fallbacks")
            .with_description("Identifiers issued from the timestamp fallback")
            .build(),
    );
    let _ = BREAKER_TRANSITIONS.set(
        meter
            .u64_counter("breaker_transitions")
            .with_description("Connection breaker state changes")
            .build(),
    );
    let _ = COUNTER_CLAMPS.set(
        meter
            .u64_counter("counter_clamps")
            .with_description("Decrements that hit a zero counter")
            .build(),
    );
}

#[cfg(feature = "metrics")]
fn add(counter: &OnceLock<Counter<u64>>, attributes: &[KeyValue]) {
    if let Some(counter) = counter.get() {
        counter.add(1, attributes);
    }
}

/// Forwards library events to the OpenTelemetry counters.
#[cfg(feature = "metrics")]
struct MetricsObserver;

#[cfg(feature = "metrics")]
impl Observer for MetricsObserver {
    fn on_event(&self, event: &Event<'_>) {
        match event {
            Event::RetryScheduled { policy, .. } => {
                add(&RETRIES, &[KeyValue::new("policy", *policy)]);
            }
            Event::RetriesExhausted { policy, .. } => {
                add(&EXHAUSTIONS, &[KeyValue::new("policy", *policy)]);
            }
            Event::FallbackIssued { field, .. } => {
                add(&FALLBACKS, &[KeyValue::new("field", field.as_str())]);
            }
            Event::BreakerOpened { .. } => {
                add(&BREAKER_TRANSITIONS, &[KeyValue::new("to", "open")]);
            }
            Event::BreakerHalfOpened => {
                add(&BREAKER_TRANSITIONS, &[KeyValue::new("to", "half-open")]);
            }
            Event::BreakerClosed => {
                add(&BREAKER_TRANSITIONS, &[KeyValue::new("to", "closed")]);
            }
            Event::CounterClamped { .. } => add(&COUNTER_CLAMPS, &[]),
            _ => {}
        }
    }
}
