use opentelemetry::trace::TraceId;
use thiserror::Error;
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("OPENTELEMETRY_ENDPOINT_URL is not set")]
    MissingEndpoint,

    #[error("Invalid collector endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Trace Error: {0}")]
    TraceError(#[from] opentelemetry::trace::TraceError),

    #[error("Subscriber Error: {0}")]
    SubscriberError(#[from] tracing::subscriber::SetGlobalDefaultError),
}

///  Fetch an opentelemetry::trace::TraceId as hex through the full tracing stack
pub fn get_trace_id() -> TraceId {
    use opentelemetry::trace::TraceContextExt as _; // opentelemetry::Context -> opentelemetry::trace::Span
    use tracing_opentelemetry::OpenTelemetrySpanExt as _; // tracing::Span to opentelemetry::Context

    tracing::Span::current()
        .context()
        .span()
        .span_context()
        .trace_id()
}

#[cfg(feature = "telemetry")]
async fn init_tracer() -> Result<opentelemetry::sdk::trace::Tracer, TelemetryError> {
    let otlp_endpoint =
        std::env::var("OPENTELEMETRY_ENDPOINT_URL").map_err(|_| TelemetryError::MissingEndpoint)?;

    let channel = tonic::transport::Channel::from_shared(otlp_endpoint)
        .map_err(|e| TelemetryError::InvalidEndpoint(e.to_string()))?
        .connect()
        .await
        .map_err(|e| TelemetryError::InvalidEndpoint(e.to_string()))?;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_channel(channel))
        .with_trace_config(opentelemetry::sdk::trace::config().with_resource(
            opentelemetry::sdk::Resource::new(vec![opentelemetry::KeyValue::new(
                "service.name",
                "backup-controller",
            )]),
        ))
        .install_batch(opentelemetry::runtime::Tokio)?;
    Ok(tracer)
}

/// Initialize tracing
pub async fn init() -> Result<(), TelemetryError> {
    // Setup tracing layers
    #[cfg(feature = "telemetry")]
    let telemetry = tracing_opentelemetry::layer().with_tracer(init_tracer().await?);
    let logger = tracing_subscriber::fmt::layer()
        .compact()
        .with_line_number(true)
        .with_target(true);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Decide on layers
    #[cfg(feature = "telemetry")]
    let collector = Registry::default().with(telemetry).with(logger).with(env_filter);
    #[cfg(not(feature = "telemetry"))]
    let collector = Registry::default().with(logger).with(env_filter);

    // Initialize tracing
    tracing::subscriber::set_global_default(collector)?;
    Ok(())
}
