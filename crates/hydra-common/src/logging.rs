//! Structured logging setup shared by every binary in the workspace.

use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Identifies this process in logs and (when enabled) traces.
pub struct LoggerConfig {
    whoami: String,
    otel_url: Option<String>,
}

impl LoggerConfig {
    pub fn new(whoami: impl Into<String>) -> Self {
        Self {
            whoami: whoami.into(),
            otel_url: None,
        }
    }

    #[cfg(feature = "otel")]
    pub fn with_otel_url(mut self, otel_url: impl Into<String>) -> Self {
        self.otel_url = Some(otel_url.into());
        self
    }
}

/// Installs a global `tracing` subscriber: `RUST_LOG`-driven filtering plus a
/// compact stdout layer, and (feature `otel`, `otel_url` set) an OTLP export
/// layer alongside it.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();
    let stdout_sub = tracing_subscriber::fmt::layer().compact().with_filter(filt);

    #[cfg(feature = "otel")]
    if let Some(otel_url) = &config.otel_url {
        use opentelemetry::trace::TracerProvider;
        use opentelemetry_otlp::WithExportConfig;

        let exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(otel_url);
        let tp = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .install_batch(opentelemetry_sdk::runtime::TokioCurrentThread)
            .expect("init: opentelemetry");
        let tracer = tp.tracer("hydra-node");
        let otel_sub = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry().with(stdout_sub).with(otel_sub).init();
        info!(whoami = %config.whoami, "logging started");
        return;
    }

    tracing_subscriber::registry().with(stdout_sub).init();
    info!(whoami = %config.whoami, "logging started");
}

/// Flushes any buffered trace exporters. Call once, on clean shutdown.
pub fn finalize() {
    info!("shutting down logging");
}
