//! Logging, tracing and metrics setup shared by the arrowport crates.
//!
//! Logs go to stdout, formatted for humans or as JSON when
//! `RUST_LOG_FORMAT=json`. Traces and metrics are exported over OTLP only
//! when `OTEL_SDK_DISABLED=false`.
use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{InstrumentationScope, global};
use opentelemetry_otlp::{ExporterBuildError, MetricExporter, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::SdkTracerProvider;
use snafu::{ResultExt, Snafu};
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::{prelude::*, registry::LookupSpan};

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug, Snafu)]
pub enum ObservabilityError {
    #[snafu(display("Failed to build exporter"))]
    Exporter { source: ExporterBuildError },
}

/// Keeps the telemetry providers alive.
///
/// Dropping the guard flushes and shuts down the exporters.
#[derive(Debug)]
pub struct ObservabilityGuard {
    trace_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

/// Returns a meter from the global meter provider.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Install the global tracing subscriber and telemetry providers.
pub fn init_observability(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<ObservabilityGuard, ObservabilityError> {
    // Exports are disabled unless explicitly enabled.
    let sdk_disabled = std::env::var(OTEL_SDK_DISABLED)
        .map(|v| v != "false")
        .unwrap_or(true);

    let (otel_layer, guard) = otel(package_name, package_version, !sdk_disabled)?;

    let layers = vec![stdout(), otel_layer];

    tracing_subscriber::registry().with(layers).init();

    Ok(guard)
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO"))
}

fn stdout<S>() -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let json_fmt = std::env::var(RUST_LOG_FORMAT)
        .map(|val| val == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(env_filter())
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .compact()
            .with_filter(env_filter())
            .boxed()
    }
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
    sdk_enabled: bool,
) -> Result<(BoxedLayer<S>, ObservabilityGuard), ObservabilityError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let package_name = package_name.into();
    let resource = Resource::builder()
        .with_service_name(package_name.to_string())
        .build();

    let scope = InstrumentationScope::builder(package_name)
        .with_version(version)
        .build();

    let mut trace_provider = SdkTracerProvider::builder().with_resource(resource.clone());

    if sdk_enabled {
        let span_exporter = SpanExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        trace_provider = trace_provider.with_batch_exporter(span_exporter);
    }

    let trace_provider = trace_provider.build();
    let tracer = trace_provider.tracer_with_scope(scope);

    let mut meter_provider = MeterProviderBuilder::default().with_resource(resource);

    if sdk_enabled {
        let metrics_exporter = MetricExporter::builder()
            .with_tonic()
            .build()
            .context(ExporterSnafu {})?;

        let metrics_reader = PeriodicReader::builder(metrics_exporter)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();

        meter_provider = meter_provider.with_reader(metrics_reader);
    }

    let meter_provider = meter_provider.build();

    global::set_meter_provider(meter_provider.clone());

    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_metrics_layer = MetricsLayer::new(meter_provider.clone());
    let otel_layer = env_filter()
        .and_then(otel_metrics_layer)
        .and_then(otel_trace_layer)
        .boxed();

    let guard = ObservabilityGuard {
        trace_provider,
        meter_provider,
    };

    Ok((otel_layer, guard))
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if let Err(err) = self.trace_provider.shutdown() {
            tracing::warn!(err = ?err, "failed to shut down trace provider");
        }
        if let Err(err) = self.meter_provider.shutdown() {
            tracing::warn!(err = ?err, "failed to shut down meter provider");
        }
    }
}
