//! # Telemetry Features
//!
//! Structured logs are always written to the console through
//! `tracing_subscriber::fmt`. OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `otel-traces`: Exports spans (requests, background refills).
//! - `otel-metrics`: Exports counters and histograms for pops and refills.
//! - `otlp`: Enables the OTLP/gRPC exporter. The endpoint is read from
//!   `OTEL_EXPORTER_OTLP_ENDPOINT`.
//! - `stdout`: Enables the stdout exporter.
//!
//! ## Feature constraints
//!
//! - Exporters require at least one of `otel-traces` or `otel-metrics`.
//! - `otlp` and `stdout` can be enabled at the same time.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin shardpool-server --features otel-traces,otel-metrics,otlp
//! cargo run --bin shardpool-server --features otel-traces,stdout
//! ```

#[cfg(all(
    feature = "otlp",
    not(any(feature = "otel-traces", feature = "otel-metrics"))
))]
compile_error!(
    "The 'otlp' feature requires at least one of 'otel-traces' or 'otel-metrics' to be enabled."
);

#[cfg(all(
    feature = "stdout",
    not(any(feature = "otel-traces", feature = "otel-metrics"))
))]
compile_error!(
    "The 'stdout' feature requires at least one of 'otel-traces' or 'otel-metrics' to be enabled."
);

use shardpool::{Kind, RefillOutcome, RefillReport};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(all(feature = "otlp", any(feature = "otel-metrics", feature = "otel-traces")))]
use opentelemetry_otlp::{Protocol, WithExportConfig};

#[cfg(feature = "otel-metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter};
#[cfg(feature = "otel-metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "otel-metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "otel-traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::propagation::TraceContextPropagator;
#[cfg(feature = "otel-traces")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    #[cfg(feature = "otel-traces")]
    pub tracer_provider: sdktrace::SdkTracerProvider,
    #[cfg(feature = "otel-metrics")]
    pub meter_provider: sdkmetrics::SdkMeterProvider,
}

impl TelemetryProviders {
    /// Flushes and stops every exporter. Call once, right before exit.
    pub fn shutdown(self) {
        #[cfg(feature = "otel-traces")]
        {
            if let Err(err) = self.tracer_provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = self.tracer_provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "otel-metrics")]
        {
            if let Err(err) = self.meter_provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = self.meter_provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }
    }
}

pub fn init_telemetry() -> anyhow::Result<TelemetryProviders> {
    #[cfg(feature = "otel-traces")]
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());

    #[cfg(feature = "otel-traces")]
    let tracer_provider = init_tracer()?;

    #[cfg(feature = "otel-metrics")]
    let meter_provider = init_metrics()?;

    #[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
    let scope = InstrumentationScope::builder("shardpool")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    // Console logs are unrelated to the `stdout` exporter: these are
    // human-readable spans and events.
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        );

    #[cfg(feature = "otel-traces")]
    let registry = {
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        )
    };

    #[cfg(feature = "otel-metrics")]
    let registry = {
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        let meter = opentelemetry::global::meter_with_scope(scope);
        init_metric_handles(&meter);

        registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ))
    };

    registry.init();

    Ok(TelemetryProviders {
        #[cfg(feature = "otel-traces")]
        tracer_provider,
        #[cfg(feature = "otel-metrics")]
        meter_provider,
    })
}

#[cfg(any(feature = "otel-metrics", feature = "otel-traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("shardpool")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(all(feature = "otlp", any(feature = "otel-metrics", feature = "otel-traces")))]
fn otlp_endpoint() -> anyhow::Result<String> {
    use anyhow::Context;
    std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").context("missing `OTEL_EXPORTER_OTLP_ENDPOINT`")
}

#[cfg(feature = "otel-metrics")]
fn init_metrics() -> anyhow::Result<sdkmetrics::SdkMeterProvider> {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .with_temporality(sdkmetrics::Temporality::Delta)
            .build()
            .context("failed to build metrics exporter")?;

        builder.with_periodic_exporter(exporter)
    };

    Ok(builder.build())
}

#[cfg(feature = "otel-traces")]
fn init_tracer() -> anyhow::Result<sdktrace::SdkTracerProvider> {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let batch = sdktrace::BatchSpanProcessor::builder(SpanExporter::default())
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    #[cfg(feature = "otlp")]
    let builder = {
        use anyhow::Context;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_timeout(std::time::Duration::from_secs(10))
            .with_endpoint(otlp_endpoint()?)
            .with_protocol(Protocol::Grpc)
            .build()
            .context("failed to build tracer exporter")?;

        let batch = sdktrace::BatchSpanProcessor::builder(exporter)
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();

        builder.with_span_processor(batch)
    };

    Ok(builder.build())
}

// Metric handles - only compiled when metrics are enabled
#[cfg(feature = "otel-metrics")]
static POPS_SERVED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static POPS_UNAVAILABLE: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static POP_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static REFILLS_COMPLETED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static REFILL_SHORTFALLS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "otel-metrics")]
static VALUES_REFILLED: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "otel-metrics")]
fn init_metric_handles(meter: &Meter) {
    let _ = POPS_SERVED.set(
        meter
            .u64_counter("pops_served")
            .with_description("Values handed out")
            .build(),
    );

    let _ = POPS_UNAVAILABLE.set(
        meter
            .u64_counter("pops_unavailable")
            .with_description("Pops answered with a retryable unavailable response")
            .build(),
    );

    let _ = POP_DURATION_MS.set(
        meter
            .f64_histogram("pop_duration")
            .with_unit("ms")
            .with_description("Time to serve one pop")
            .build(),
    );

    let _ = REFILLS_COMPLETED.set(
        meter
            .u64_counter("refills_completed")
            .with_description("Background refills that ran to an outcome")
            .build(),
    );

    let _ = REFILL_SHORTFALLS.set(
        meter
            .u64_counter("refill_shortfalls")
            .with_description("Background refills that inserted fewer values than requested")
            .build(),
    );

    let _ = VALUES_REFILLED.set(
        meter
            .u64_counter("values_refilled")
            .with_description("Values inserted by background refills")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "otel-metrics")]
pub fn increment_pops_served(kind: Kind) {
    if let Some(counter) = POPS_SERVED.get() {
        counter.add(1, &[KeyValue::new("kind", kind.as_str())]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_pops_served(_kind: Kind) {}

#[cfg(feature = "otel-metrics")]
pub fn increment_pops_unavailable() {
    if let Some(counter) = POPS_UNAVAILABLE.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn increment_pops_unavailable() {}

#[cfg(feature = "otel-metrics")]
pub fn record_pop_duration(duration_ms: f64) {
    if let Some(histogram) = POP_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_pop_duration(_duration_ms: f64) {}

#[cfg(feature = "otel-metrics")]
pub fn record_refill(report: &RefillReport) {
    let attrs = [
        KeyValue::new("kind", report.kind.as_str()),
        KeyValue::new("partition", i64::from(report.partition)),
    ];
    if let Some(counter) = REFILLS_COMPLETED.get() {
        counter.add(1, &attrs);
    }
    if report.outcome != RefillOutcome::Complete {
        if let Some(counter) = REFILL_SHORTFALLS.get() {
            counter.add(1, &attrs);
        }
    }
    if let Some(counter) = VALUES_REFILLED.get() {
        counter.add(report.inserted as u64, &attrs);
    }
}

#[cfg(not(feature = "otel-metrics"))]
pub fn record_refill(report: &RefillReport) {
    if report.outcome != RefillOutcome::Complete {
        tracing::debug!(
            partition = report.partition,
            shortfall = report.shortfall(),
            "refill shortfall recorded"
        );
    }
}
