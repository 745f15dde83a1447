//! # Bitrepository Telemetry
//!
//! Logging and metrics for the conversation engine.
//!
//! ## Components
//!
//! - **Logging**: `tracing` subscriber with env-filter, pretty or JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms for conversations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use br_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     init_telemetry(&TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!
//!     // Conversations now log with correlation ids and update metrics
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BR_SERVICE_NAME` | `bitrepository-client` | Service name in the startup line |
//! | `BR_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `BR_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `BR_JSON_LOGS` | `false` | JSON log lines (default `true` in containers) |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    gather_metrics, register_metrics, CONTRIBUTOR_FAILURES, CONVERSATIONS_ACTIVE,
    CONVERSATIONS_COMPLETED, CONVERSATIONS_FAILED, CONVERSATIONS_STARTED,
    CONVERSATION_DURATION, EVENTS_DROPPED, MESSAGES_DISCARDED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the logging subscriber.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Metrics first (no global side effects beyond the registry)
    register_metrics()?;
    init_logging(config)
}
