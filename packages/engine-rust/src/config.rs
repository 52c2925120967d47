/// Mediator-level configuration.
///
/// Controls the built-in middleware limits, delivery isolation, and logging.
#[derive(Debug, Clone)]
pub struct MediatorConfig {
    /// Deadline applied by the built-in timeout middleware, in milliseconds.
    pub default_request_timeout_ms: u64,
    /// Maximum number of in-flight requests before load shedding.
    pub max_concurrent_requests: u32,
    /// Record a panicking delivery target as a failed delivery instead of unwinding `publish`.
    pub catch_subscriber_panics: bool,
    pub log: LogConfig,
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: 30_000,
            max_concurrent_requests: 1000,
            catch_subscriber_panics: true,
            log: LogConfig::default(),
        }
    }
}

/// Logging configuration consumed by [`crate::telemetry::init_tracing`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,courier_engine=debug`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}
