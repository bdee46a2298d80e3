//! OpenTelemetry integration for marketplace-auth
//!
//! This module wires `tracing` to a JSON log subscriber and, when enabled,
//! to OTLP span and metric exporters. [`SecurityMetrics`] holds the
//! counters the authentication core records into.

use crate::config::{LoggingConfig, OtelConfig};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider
///
/// Owns the tracer and meter providers. With export disabled the meter
/// provider has no reader, so instruments are cheap no-ops.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        Ok(TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build())
    }

    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build())
    }

    /// Get a tracer from the provider
    pub fn tracer(&self, name: &'static str) -> opentelemetry_sdk::trace::Tracer {
        match self.tracer_provider {
            Some(ref tp) => tp.tracer(name),
            None => TracerProvider::builder().build().tracer(name),
        }
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Flush spans and stop the meter provider
    pub fn shutdown(&self) -> Result<(), OtelError> {
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Security metrics recorded by the authentication core
pub struct SecurityMetrics {
    /// Login attempts by outcome
    pub login_attempts_total: Counter<u64>,

    /// Accounts locked after repeated failures
    pub account_lockouts_total: Counter<u64>,

    /// Requests rejected by the rate limiter, by operation
    pub rate_limited_total: Counter<u64>,

    /// Audit events written, by type
    pub security_events_total: Counter<u64>,

    /// Audit events that could not be persisted
    pub audit_write_failures_total: Counter<u64>,

    /// Monitoring alerts raised, by kind
    pub alerts_raised_total: Counter<u64>,

    /// Password hash computation time in seconds
    pub password_hash_duration: Histogram<f64>,
}

impl SecurityMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            login_attempts_total: meter
                .u64_counter("marketplace_auth_login_attempts_total")
                .with_description("Login attempts by outcome")
                .init(),
            account_lockouts_total: meter
                .u64_counter("marketplace_auth_account_lockouts_total")
                .with_description("Accounts locked after repeated failed logins")
                .init(),
            rate_limited_total: meter
                .u64_counter("marketplace_auth_rate_limited_total")
                .with_description("Requests rejected by the rate limiter")
                .init(),
            security_events_total: meter
                .u64_counter("marketplace_auth_security_events_total")
                .with_description("Security audit events written")
                .init(),
            audit_write_failures_total: meter
                .u64_counter("marketplace_auth_audit_write_failures_total")
                .with_description("Security audit events that failed to persist")
                .init(),
            alerts_raised_total: meter
                .u64_counter("marketplace_auth_alerts_raised_total")
                .with_description("Monitoring alerts raised")
                .init(),
            password_hash_duration: meter
                .f64_histogram("marketplace_auth_password_hash_duration_seconds")
                .with_description("Password hash and verify duration in seconds")
                .init(),
        }
    }

    /// Metrics backed by the global (no-op unless configured) meter
    pub fn global() -> Self {
        Self::new(&global::meter("marketplace-auth"))
    }

    pub fn record_login(&self, outcome: &str) {
        self.login_attempts_total
            .add(1, &[KeyValue::new("outcome", outcome.to_string())]);
    }

    pub fn record_lockout(&self) {
        self.account_lockouts_total.add(1, &[]);
    }

    pub fn record_rate_limited(&self, operation: &str) {
        self.rate_limited_total
            .add(1, &[KeyValue::new("operation", operation.to_string())]);
    }

    pub fn record_event(&self, event_type: &str) {
        self.security_events_total
            .add(1, &[KeyValue::new("event_type", event_type.to_string())]);
    }

    pub fn record_audit_failure(&self) {
        self.audit_write_failures_total.add(1, &[]);
    }

    pub fn record_alert(&self, kind: &str) {
        self.alerts_raised_total
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    pub fn record_hash_duration(&self, operation: &str, duration_secs: f64) {
        self.password_hash_duration.record(
            duration_secs,
            &[KeyValue::new("operation", operation.to_string())],
        );
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. Output is JSON unless
/// `logging.format` is `pretty` or `text`.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(normalize_level(&logging.level)));

    let otel_layer = if otel.is_enabled() {
        Some(tracing_opentelemetry::layer().with_tracer(otel.tracer("marketplace-auth")))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(fmt_layer(&logging.format))
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))
}

fn fmt_layer<S>(format: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    match format.to_lowercase().as_str() {
        "pretty" | "text" => tracing_subscriber::fmt::layer().boxed(),
        _ => tracing_subscriber::fmt::layer().json().boxed(),
    }
}

fn normalize_level(level: &str) -> &'static str {
    match level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_config() -> OtelConfig {
        OtelConfig {
            enabled: false,
            endpoint: None,
            insecure: false,
            service_name: "test-service".to_string(),
        }
    }

    // Test 1: Disabled provider has no tracer provider
    #[test]
    fn test_otel_provider_disabled() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();
        assert!(!provider.is_enabled());
        assert!(provider.tracer_provider.is_none());
    }

    // Test 2: Enabled provider requires an endpoint
    #[test]
    fn test_otel_provider_requires_endpoint_when_enabled() {
        let config = OtelConfig {
            enabled: true,
            ..disabled_config()
        };

        match OtelProvider::new(&config) {
            Err(OtelError::Config(msg)) => assert!(msg.contains("endpoint is required")),
            _ => panic!("Expected OtelError::Config"),
        }
    }

    // Test 3: Security metrics record without panicking
    #[test]
    fn test_security_metrics_record() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();
        let metrics = SecurityMetrics::new(&provider.meter());

        metrics.record_login("success");
        metrics.record_login("invalid_credentials");
        metrics.record_lockout();
        metrics.record_rate_limited("login_ip");
        metrics.record_event("LOGIN_ATTEMPT");
        metrics.record_audit_failure();
        metrics.record_alert("failed_login_spike");
        metrics.record_hash_duration("hash", 0.05);
    }

    // Test 4: Global metrics are usable without a provider
    #[test]
    fn test_security_metrics_global() {
        let metrics = SecurityMetrics::global();
        metrics.record_event("REGISTRATION");
    }

    // Test 5: Provider shutdown
    #[test]
    fn test_otel_provider_shutdown() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();
        assert!(provider.shutdown().is_ok());
    }

    // Test 6: Level names normalize
    #[test]
    fn test_normalize_level() {
        assert_eq!(normalize_level("DEBUG"), "debug");
        assert_eq!(normalize_level("warning"), "warn");
        assert_eq!(normalize_level("nonsense"), "info");
    }

    // Test 7: OtelError display
    #[test]
    fn test_otel_error_display() {
        let err = OtelError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");

        let err = OtelError::Shutdown("shutdown error".to_string());
        assert_eq!(err.to_string(), "Failed to shutdown: shutdown error");
    }

    // Test 8: Default config names the service
    #[test]
    fn test_default_otel_config() {
        let config = OtelConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.service_name, "marketplace-auth");
    }
}
