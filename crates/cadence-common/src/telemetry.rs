//! Logging, tracing and metrics export for the cadence operator
//!
//! Logs always go to stdout. When an OTLP endpoint is configured, spans and
//! the scaler metrics are pushed to it as well. Metrics are exported with
//! delta temporality: only series that reported during an interval are sent,
//! so a deleted scaler's series end once the controller forgets it.

use std::str::FromStr;

use opentelemetry::metrics::Meter;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider, Temporality};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info,cadence=debug,kube=info,tower=warn,hyper=warn";

/// Instrumentation scope of every scaler metric
pub const METER_NAME: &str = "cadence";

/// Downward-API variables copied onto the exported resource
const POD_ATTRIBUTES: [(&str, &str); 4] = [
    ("POD_NAME", "k8s.pod.name"),
    ("POD_NAMESPACE", "k8s.namespace.name"),
    ("NODE_NAME", "k8s.node.name"),
    ("CONTAINER_NAME", "k8s.container.name"),
];

/// Telemetry setup failures
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The OTLP span exporter could not be built
    #[error("failed to initialize tracer: {0}")]
    Tracer(String),

    /// The OTLP metric exporter could not be built
    #[error("failed to initialize metrics exporter: {0}")]
    Metrics(String),

    /// A global subscriber was already installed
    #[error("failed to initialize tracing subscriber: {0}")]
    Subscriber(String),
}

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, with the current span
    #[default]
    Json,
    /// Human-readable lines for local runs
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(format!("unknown log format {other:?}, expected json or text")),
        }
    }
}

/// Telemetry settings
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `service.name` on exported spans and metrics
    pub service_name: String,
    /// OTLP gRPC endpoint; `None` keeps telemetry in the logs
    pub otlp_endpoint: Option<String>,
    /// Log line format
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "cadence-operator".to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            log_format: LogFormat::default(),
        }
    }
}

/// Installed exporters; call [`Telemetry::shutdown`] before exit to flush them
#[derive(Default)]
pub struct Telemetry {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    /// Whether spans and metrics leave the process
    pub fn is_exporting(&self) -> bool {
        self.meter_provider.is_some()
    }

    /// Flush pending spans and the last metric interval
    pub fn shutdown(self) {
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush metrics");
            }
        }
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "failed to flush spans");
            }
        }
    }
}

/// Meter the scaler instruments register on
///
/// Resolves against whatever provider [`init_telemetry`] installed, so it
/// must be called after initialization to reach the exporter.
pub fn scaler_meter() -> Meter {
    global::meter(METER_NAME)
}

/// Install the global subscriber and, with an endpoint, the OTLP exporters
///
/// Must run inside a Tokio runtime when an endpoint is configured.
pub fn init_telemetry(config: TelemetryConfig) -> Result<Telemetry, TelemetryError> {
    global::set_text_map_propagator(TraceContextPropagator::new());

    let mut telemetry = Telemetry::default();
    let otel_layer = match config.otlp_endpoint.as_deref() {
        Some(endpoint) => {
            let resource = build_resource(&config.service_name);

            let meter_provider = otlp_meter_provider(endpoint, resource.clone())?;
            global::set_meter_provider(meter_provider.clone());

            let tracer_provider = otlp_tracer_provider(endpoint, resource)?;
            global::set_tracer_provider(tracer_provider.clone());
            let tracer = tracer_provider.tracer(config.service_name.clone());

            telemetry = Telemetry {
                tracer_provider: Some(tracer_provider),
                meter_provider: Some(meter_provider),
            };
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let json_layer = (config.log_format == LogFormat::Json).then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
    });
    let text_layer =
        (config.log_format == LogFormat::Text).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(otel_layer)
        .try_init()
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    Ok(telemetry)
}

fn build_resource(service_name: &str) -> Resource {
    let pod = POD_ATTRIBUTES
        .iter()
        .filter_map(|(var, key)| std::env::var(var).ok().map(|value| KeyValue::new(*key, value)));

    Resource::new(
        [
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_NAME,
                service_name.to_string(),
            ),
            KeyValue::new(
                opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            ),
        ]
        .into_iter()
        .chain(pod),
    )
}

fn otlp_tracer_provider(endpoint: &str, resource: Resource) -> Result<TracerProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| TelemetryError::Tracer(e.to_string()))?;

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_resource(resource)
        .build())
}

fn otlp_meter_provider(endpoint: &str, resource: Resource) -> Result<SdkMeterProvider, TelemetryError> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .with_temporality(Temporality::Delta)
        .build()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

    Ok(SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_names_the_operator() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "cadence-operator");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn log_format_parses_either_case() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("TEXT".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn resource_carries_service_identity() {
        let resource = build_resource("cadence-test");
        assert_eq!(
            resource
                .get(opentelemetry::Key::from_static_str(
                    opentelemetry_semantic_conventions::resource::SERVICE_NAME
                ))
                .map(|v| v.to_string()),
            Some("cadence-test".to_string())
        );
    }

    #[test]
    fn nothing_exports_without_an_endpoint() {
        let telemetry = Telemetry::default();
        assert!(!telemetry.is_exporting());
        telemetry.shutdown();
    }
}
