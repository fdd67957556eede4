use crate::Environment;
use crate::logging::{env_filter, fmt_layer};
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const METRIC_EXPORT_INTERVAL: Duration = Duration::from_secs(10);

fn resource(service_name: &str, environment: Environment) -> Resource {
    Resource::builder()
        .with_attributes([
            KeyValue::new(SERVICE_NAME, service_name.to_string()),
            KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
            KeyValue::new("deployment.environment", environment.as_str()),
        ])
        .build()
}

fn tracer_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    Ok(SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .with_batch_exporter(exporter)
        .build())
}

fn meter_provider(endpoint: &str, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRIC_EXPORT_INTERVAL)
        .build();
    Ok(SdkMeterProvider::builder()
        .with_resource(resource)
        .with_reader(reader)
        .build())
}

/// OTLP span and metric export for the lifetime of the guard.
///
/// Dropping it flushes and shuts both providers down. Must be created inside
/// a Tokio runtime since the batch exporters spawn onto it.
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Installs the global providers and a subscriber that forwards `tracing`
    /// spans to them alongside the regular log output.
    pub fn init(service_name: &str, endpoint: &str, environment: Environment) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = resource(service_name, environment);
        let tracer_provider = tracer_provider(endpoint, resource.clone())?;
        let meter_provider = meter_provider(endpoint, resource)?;
        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        let spans = tracing_opentelemetry::layer().with_tracer(global::tracer(service_name.to_string()));
        tracing_subscriber::registry()
            .with(fmt_layer(environment))
            .with(spans)
            .with(env_filter())
            .init();

        tracing::info!(service = service_name, endpoint, "OTLP export enabled");
        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        // The subscriber may already be torn down, so report on stderr.
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Tracer provider shutdown failed: {e:?}");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Meter provider shutdown failed: {e:?}");
        }
    }
}

/// Sets up logging, and OTLP export when an endpoint is configured.
/// An exporter that fails to start degrades to local logging.
///
/// Keep the returned guard alive until the process exits.
pub fn init_observability(
    service_name: &str,
    endpoint: Option<&str>,
    environment: Environment,
) -> Option<TelemetryGuard> {
    let Some(endpoint) = endpoint else {
        crate::logging::setup_logging(environment);
        return None;
    };
    match TelemetryGuard::init(service_name, endpoint, environment) {
        Ok(guard) => Some(guard),
        Err(e) => {
            crate::logging::setup_logging(environment);
            tracing::warn!(error = %e, endpoint, "Telemetry init failed, logging locally only");
            None
        }
    }
}
