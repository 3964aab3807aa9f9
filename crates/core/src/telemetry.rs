// Telemetry Module
//
// Structured logging through tracing-subscriber plus optional OpenTelemetry
// trace export over OTLP/gRPC. Every service binary calls `init_telemetry`
// once at startup and keeps the guard alive until shutdown.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    trace::{RandomIdGenerator, Sampler, SdkTracerProvider},
    Resource,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default sampling ratio for exported traces
pub const DEFAULT_SAMPLER_RATIO: f64 = 0.01;

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Configuration for logging and trace export
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name for traces
    pub service_name: String,
    /// Service version
    pub service_version: Option<String>,
    /// OTLP endpoint (e.g., "http://localhost:4317")
    pub otlp_endpoint: Option<String>,
    /// Whether trace export is switched on (TRACES_ENABLED)
    pub traces_enabled: bool,
    /// Fraction of root traces that are sampled
    pub sampler_ratio: f64,
    /// Log filter (e.g., "info", "debug", "autoads_adscenter=debug")
    pub log_filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "autoads".to_string(),
            service_version: None,
            otlp_endpoint: None,
            traces_enabled: false,
            sampler_ratio: DEFAULT_SAMPLER_RATIO,
            log_filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `OTEL_SERVICE_NAME`: Service name (default: the given binary name)
    /// - `OTEL_SERVICE_VERSION`: Service version
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint
    /// - `TRACES_ENABLED`: "true" to export traces
    /// - `TRACES_SAMPLER_RATIO`: ratio in [0,1] (default 0.01)
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter (default "info")
    pub fn from_env(default_service_name: &str) -> Self {
        Self {
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| default_service_name.to_string()),
            service_version: std::env::var("OTEL_SERVICE_VERSION").ok(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            traces_enabled: std::env::var("TRACES_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            sampler_ratio: std::env::var("TRACES_SAMPLER_RATIO")
                .ok()
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(clamp_ratio)
                .unwrap_or(DEFAULT_SAMPLER_RATIO),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
        }
    }

    /// Endpoint to export to, only when export is switched on
    pub fn export_endpoint(&self) -> Option<&str> {
        if self.traces_enabled {
            self.otlp_endpoint.as_deref()
        } else {
            None
        }
    }
}

fn clamp_ratio(ratio: f64) -> f64 {
    if ratio.is_nan() {
        DEFAULT_SAMPLER_RATIO
    } else {
        ratio.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Guard that shuts down the tracer provider when dropped
pub struct TelemetryGuard {
    _provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self._provider.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("Failed to shutdown tracer provider: {:?}", e);
            }
        }
    }
}

/// Initialize logging and (optionally) trace export.
///
/// Returns a guard that will shut down the tracer provider when dropped.
///
/// ```ignore
/// use autoads_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// let _guard = init_telemetry(TelemetryConfig::from_env("siterank"));
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let mut resource_attrs = vec![KeyValue::new("service.name", config.service_name.clone())];
    if let Some(version) = &config.service_version {
        resource_attrs.push(KeyValue::new("service.version", version.clone()));
    }
    let resource = Resource::builder().with_attributes(resource_attrs).build();

    let filter = config
        .log_filter
        .as_ref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);

    let (tracer_provider, otel_layer, otel_status) = match config.export_endpoint() {
        Some(endpoint) => match build_otlp_tracer(endpoint, config.sampler_ratio, resource) {
            Ok((provider, tracer)) => {
                let layer = tracing_opentelemetry::layer().with_tracer(tracer);
                (Some(provider), Some(layer), Some(Ok(endpoint.to_string())))
            }
            Err(e) => (None, None, Some(Err(e.to_string()))),
        },
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(otel_layer)
        .init();

    match otel_status {
        Some(Ok(endpoint)) => {
            tracing::info!(
                endpoint = %endpoint,
                ratio = config.sampler_ratio,
                "OpenTelemetry tracing enabled"
            );
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Failed to initialize OTLP tracer, continuing without tracing");
        }
        None => {
            tracing::debug!("OpenTelemetry tracing disabled");
        }
    }

    TelemetryGuard {
        _provider: tracer_provider,
    }
}

fn build_otlp_tracer(
    endpoint: &str,
    ratio: f64,
    resource: Resource,
) -> Result<(SdkTracerProvider, opentelemetry_sdk::trace::Tracer), opentelemetry::trace::TraceError>
{
    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_timeout(Duration::from_secs(10))
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
            ratio,
        ))))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("autoads");

    Ok((provider, tracer))
}
