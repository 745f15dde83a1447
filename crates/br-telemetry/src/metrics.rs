//! Prometheus metrics for the conversation engine.
//!
//! All metrics follow the naming convention: `br_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., conversations_started_total)
//! - **Gauge**: Value that can go up or down (e.g., conversations_active)
//! - **Histogram**: Distribution of values (e.g., conversation_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge,
    Opts, Registry, TextEncoder,
};
use std::sync::Once;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONVERSATION LIFECYCLE
    // =========================================================================

    /// Conversations registered with a mediator
    pub static ref CONVERSATIONS_STARTED: IntCounter = IntCounter::new(
        "br_conversations_started_total",
        "Total number of conversations started"
    ).expect("metric creation failed");

    /// Conversations that ended with a Complete event
    pub static ref CONVERSATIONS_COMPLETED: IntCounter = IntCounter::new(
        "br_conversations_completed_total",
        "Total number of conversations that completed"
    ).expect("metric creation failed");

    /// Conversations that ended with a Failed event
    pub static ref CONVERSATIONS_FAILED: IntCounter = IntCounter::new(
        "br_conversations_failed_total",
        "Total number of conversations that failed"
    ).expect("metric creation failed");

    /// Conversations currently registered
    pub static ref CONVERSATIONS_ACTIVE: IntGauge = IntGauge::new(
        "br_conversations_active",
        "Number of conversations currently in flight"
    ).expect("metric creation failed");

    /// Time from start to terminal event
    pub static ref CONVERSATION_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "br_conversation_duration_seconds",
            "Time from conversation start to its terminal event"
        ).buckets(exponential_buckets(0.001, 2.0, 20).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGE ROUTING
    // =========================================================================

    /// Inbound messages discarded before or during processing
    pub static ref MESSAGES_DISCARDED: IntCounterVec = IntCounterVec::new(
        Opts::new("br_messages_discarded_total", "Inbound messages discarded"),
        &["reason"]  // reason: unknown_correlation/terminated/foreign_collection/unexpected_kind/...
    ).expect("metric creation failed");

    /// Per-contributor failures
    pub static ref CONTRIBUTOR_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("br_contributor_failures_total", "Contributor failures by kind"),
        &["kind"]  // kind: negative_response/timeout/send_failed/aborted
    ).expect("metric creation failed");

    /// Lifecycle events dropped because a subscriber buffer was full
    pub static ref EVENTS_DROPPED: IntCounter = IntCounter::new(
        "br_events_dropped_total",
        "Operation events dropped because the subscriber was not keeping up"
    ).expect("metric creation failed");
}

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once; registration happens on the first call only.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
            // Lifecycle
            Box::new(CONVERSATIONS_STARTED.clone()),
            Box::new(CONVERSATIONS_COMPLETED.clone()),
            Box::new(CONVERSATIONS_FAILED.clone()),
            Box::new(CONVERSATIONS_ACTIVE.clone()),
            Box::new(CONVERSATION_DURATION.clone()),
            // Routing
            Box::new(MESSAGES_DISCARDED.clone()),
            Box::new(CONTRIBUTOR_FAILURES.clone()),
            Box::new(EVENTS_DROPPED.clone()),
        ];

        for metric in metrics {
            if let Err(e) = REGISTRY.register(metric) {
                result = Err(TelemetryError::MetricsInit(e.to_string()));
                return;
            }
        }
    });
    result
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
