//! Tracing and OpenTelemetry initialization.
//!
//! Local structured logging is always on, filtered by `RUST_LOG` (default
//! `info`). When an `OTEL_EXPORTER_OTLP_ENDPOINT` is configured, spans are
//! additionally exported over OTLP/gRPC.

use std::env;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
use opentelemetry_semantic_conventions::SCHEMA_URL;
use opentelemetry_semantic_conventions::attribute::{
    DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION,
};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Semantic resource describing this service.
fn resource(name: &'static str, version: &'static str) -> Resource {
    let deployment_env = env::var("DEPLOYMENT_ENV").unwrap_or_else(|_| "develop".to_string());
    Resource::builder()
        .with_service_name(name)
        .with_schema_url(
            [
                KeyValue::new(SERVICE_VERSION, version),
                KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment_env),
            ],
            SCHEMA_URL,
        )
        .build()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Holds the tracer provider for graceful flush on shutdown.
pub struct Telemetry {
    tracer_provider: Option<SdkTracerProvider>,
}

impl Telemetry {
    /// Registers the global tracing subscriber.
    ///
    /// OTLP export turns on when `OTEL_EXPORTER_OTLP_ENDPOINT` is set;
    /// otherwise only the local fmt layer is installed.
    pub fn init(name: &'static str, version: &'static str) -> Self {
        if env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_err() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(tracing_subscriber::fmt::layer())
                .init();
            tracing::info!("OpenTelemetry export is not enabled");
            return Self {
                tracer_provider: None,
            };
        }

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .build()
            .expect("Failed to build OTLP span exporter");
        let tracer_provider = SdkTracerProvider::builder()
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                1.0,
            ))))
            .with_id_generator(RandomIdGenerator::default())
            .with_resource(resource(name, version))
            .with_batch_exporter(exporter)
            .build();
        let tracer = tracer_provider.tracer(name);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer())
            .with(OpenTelemetryLayer::new(tracer))
            .init();
        tracing::info!("OpenTelemetry tracing exporter is enabled via OTLP/gRPC");

        Self {
            tracer_provider: Some(tracer_provider),
        }
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        if let Some(tracer_provider) = self.tracer_provider.as_ref()
            && let Err(err) = tracer_provider.shutdown()
        {
            eprintln!("{err:?}");
        }
    }
}
