//! # Logging and metrics helpers
//!
//! Logs are written to stdout through `tracing-subscriber`. The output format is
//! controlled with the following environment variables:
//!
//!  - `RUST_LOG`: standard env filter, defaults to `info`.
//!  - `RUST_LOG_FORMAT`: set to `json` to emit one JSON object per line.
//!
//! Traces and metrics are exported over OTLP when `OTEL_SDK_DISABLED=false`.
//! The exporter is configured with the standard `OTEL_EXPORTER_OTLP_*`
//! variables. Otherwise no meter provider is installed and metrics are no-ops.

use std::borrow::Cow;
use std::time::Duration;

use error_stack::{Result, ResultExt};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, InstrumentationScope};
use opentelemetry_otlp::{MetricExporter, SpanExporter};
use opentelemetry_sdk::metrics::{MeterProviderBuilder, PeriodicReader};
use opentelemetry_sdk::resource::{ResourceDetector, SdkProvidedResourceDetector};
use opentelemetry_sdk::trace::TracerProvider;
use tracing::Subscriber;
use tracing_opentelemetry::MetricsLayer;
use tracing_subscriber::{prelude::*, registry::LookupSpan, EnvFilter, Layer};

pub use opentelemetry::metrics::{Counter, Histogram, Meter};
pub use opentelemetry::KeyValue;

const OTEL_SDK_DISABLED: &str = "OTEL_SDK_DISABLED";
const RUST_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

/// How often metrics are pushed to the collector.
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

pub type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

#[derive(Debug)]
pub struct OpenTelemetryInitError;
impl error_stack::Context for OpenTelemetryInitError {}

impl std::fmt::Display for OpenTelemetryInitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("failed to initialize opentelemetry")
    }
}

/// Returns the named meter from the global meter provider.
pub fn meter(name: &'static str) -> Meter {
    global::meter(name)
}

/// Initialize logging, and the OpenTelemetry exporters unless disabled.
///
/// Call once during startup, from within the tokio runtime.
///
/// ```rs
/// use evm_ingest_observability::init_opentelemetry;
///
/// init_opentelemetry(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")).unwrap();
/// ```
pub fn init_opentelemetry(
    package_name: impl Into<Cow<'static, str>>,
    package_version: impl Into<Cow<'static, str>>,
) -> Result<(), OpenTelemetryInitError> {
    // Exports are opt-in, unlike what the OpenTelemetry SDK does by default.
    let sdk_disabled = is_sdk_disabled(std::env::var(OTEL_SDK_DISABLED).ok().as_deref());

    let mut layers = vec![stdout()];

    if !sdk_disabled {
        let otel_layer = otel(package_name, package_version)?;
        layers.push(otel_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .change_context(OpenTelemetryInitError)
        .attach_printable("a global subscriber is already installed")
}

fn is_sdk_disabled(value: Option<&str>) -> bool {
    value.map(|v| v == "true").unwrap_or(true)
}

fn otel<S>(
    package_name: impl Into<Cow<'static, str>>,
    version: impl Into<Cow<'static, str>>,
) -> Result<BoxedLayer<S>, OpenTelemetryInitError>
where
    S: Subscriber + Send + Sync,
    for<'a> S: LookupSpan<'a>,
{
    let otel_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let resource = SdkProvidedResourceDetector.detect(Duration::from_secs(1));
    let scope = InstrumentationScope::builder(package_name.into())
        .with_version(version.into())
        .build();

    let span_exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create span exporter")?;

    let trace_provider = TracerProvider::builder()
        .with_resource(resource.clone())
        .with_batch_exporter(span_exporter, opentelemetry_sdk::runtime::Tokio)
        .build();

    let tracer = trace_provider.tracer_with_scope(scope);

    let metrics_exporter = MetricExporter::builder()
        .with_tonic()
        .build()
        .change_context(OpenTelemetryInitError)
        .attach_printable("failed to create metrics exporter")?;

    let metrics_reader =
        PeriodicReader::builder(metrics_exporter, opentelemetry_sdk::runtime::Tokio)
            .with_interval(METRICS_EXPORT_INTERVAL)
            .build();

    let meter_provider = MeterProviderBuilder::default()
        .with_resource(resource)
        .with_reader(metrics_reader)
        .build();

    global::set_meter_provider(meter_provider.clone());

    let otel_trace_layer = tracing_opentelemetry::layer().with_tracer(tracer);
    let otel_metrics_layer = MetricsLayer::new(meter_provider);

    Ok(otel_trace_layer
        .and_then(otel_metrics_layer)
        .and_then(otel_env_filter)
        .boxed())
}

fn stdout<S>() -> BoxedLayer<S>
where
    S: Subscriber,
    for<'a> S: LookupSpan<'a>,
{
    let log_env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_fmt = std::env::var(RUST_LOG_FORMAT)
        .map(|val| val == "json")
        .unwrap_or(false);

    if json_fmt {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .json()
            .with_filter(log_env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
            .compact()
            .with_filter(log_env_filter)
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::is_sdk_disabled;

    #[test]
    pub fn test_sdk_disabled_by_default() {
        assert!(is_sdk_disabled(None));
        assert!(is_sdk_disabled(Some("true")));
        assert!(!is_sdk_disabled(Some("false")));
        assert!(!is_sdk_disabled(Some("")));
    }
}
