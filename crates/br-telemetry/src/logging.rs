//! Structured logging setup.
//!
//! Every conversation log line carries the same core fields so a log
//! aggregator can reassemble one operation from many interleaved ones:
//! - `correlation_id`: the conversation's routing key
//! - `contributor`: the pillar a line concerns, when there is one
//! - Additional context fields

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    if !config.console_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else if config.json_logs {
        // JSON output for containers/production
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        // Pretty output for development
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Logging initialized"
    );

    Ok(())
}

/// Log a conversation-scoped event with the correlation id attached.
///
/// ```rust,ignore
/// log_conversation!(info, conversation_id, "Conversation started", operation = %kind);
/// ```
#[macro_export]
macro_rules! log_conversation {
    ($level:ident, $correlation_id:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            correlation_id = %$correlation_id,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a contributor-scoped event within a conversation.
#[macro_export]
macro_rules! log_contributor {
    ($level:ident, $correlation_id:expr, $contributor:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            correlation_id = %$correlation_id,
            contributor = %$contributor,
            $($($field)*,)?
            $msg
        )
    };
}
