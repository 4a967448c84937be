mod logging;

pub use logging::{LogBuffer, LogBufferLayer, LogQuery, LogRecord};

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Console log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines on stderr.
    #[default]
    Pretty,
    /// One JSON object per line on stderr.
    Json,
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (e.g. `warn`). Overridden by `RUST_LOG`.
    pub log_level: String,
    /// Per-module directives (e.g. `parley_engine` => `debug`).
    pub module_levels: Vec<(String, String)>,
    pub format: LogFormat,
    /// Number of warn+ records kept for the log panel.
    pub buffer_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            module_levels: Vec::new(),
            format: LogFormat::Pretty,
            buffer_capacity: 200,
        }
    }
}

impl TelemetryConfig {
    /// The filter used when `RUST_LOG` is unset.
    pub fn filter_directive(&self) -> String {
        let mut filter = self.log_level.to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{module}={}", level.to_lowercase()));
        }
        filter
    }
}

/// Handle returned by [`init_telemetry`].
pub struct TelemetryGuard {
    buffer: Arc<LogBuffer>,
}

impl TelemetryGuard {
    /// Recent warnings and errors, for the log panel.
    pub fn logs(&self) -> &LogBuffer {
        &self.buffer
    }
}

/// Initialize the global subscriber. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.filter_directive()))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let fmt_layer = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let buffer = Arc::new(LogBuffer::new(config.buffer_capacity));

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .with(LogBufferLayer::new(buffer.clone()))
        .init();

    TelemetryGuard { buffer }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_directive_includes_module_levels() {
        let config = TelemetryConfig {
            log_level: "INFO".into(),
            module_levels: vec![("parley_client".into(), "DEBUG".into())],
            ..TelemetryConfig::default()
        };
        assert_eq!(config.filter_directive(), "info,parley_client=debug");
    }

    #[test]
    fn defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter_directive(), "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.buffer_capacity, 200);
    }
}
