//! Metric name and label definitions.
//!
//! Every metric courier records is named here so the set stays documented in
//! one place.

/// HTTP request metrics
pub mod http {
    /// Total number of HTTP requests handled
    pub const REQUESTS_TOTAL: &str = "courier_http_requests_total";
    /// Duration of HTTP requests in seconds
    pub const REQUEST_DURATION_SECONDS: &str = "courier_http_request_duration_seconds";
    /// Send requests rejected at the boundary (missing number or message)
    pub const SUBMIT_REJECTED_TOTAL: &str = "courier_http_submit_rejected_total";
}

/// Outbound delivery metrics
pub mod delivery {
    /// Messages handed to the delivery driver
    pub const DISPATCHED_TOTAL: &str = "courier_delivery_dispatched_total";
    /// Messages parked in the dispatch queue because the transport was not ready
    pub const QUEUED_TOTAL: &str = "courier_delivery_queued_total";
    /// Current dispatch queue depth
    pub const QUEUE_DEPTH: &str = "courier_delivery_queue_depth";
    /// Messages accepted by the transport
    pub const SENT_TOTAL: &str = "courier_delivery_sent_total";
    /// Send attempts the transport rejected
    pub const SEND_FAILURES_TOTAL: &str = "courier_delivery_send_failures_total";
    /// Send attempt duration in seconds
    pub const SEND_DURATION_SECONDS: &str = "courier_delivery_send_duration_seconds";
    /// Retries scheduled after a failed send
    pub const RETRIES_SCHEDULED_TOTAL: &str = "courier_delivery_retries_scheduled_total";
    /// Retries currently waiting on their timer
    pub const RETRIES_PENDING: &str = "courier_delivery_retries_pending";
    /// Messages dropped after exhausting a configured attempt cap
    pub const GAVE_UP_TOTAL: &str = "courier_delivery_gave_up_total";
    /// Queue flushes triggered by a readiness transition
    pub const FLUSHES_TOTAL: &str = "courier_delivery_flushes_total";
}

/// Transport connection metrics
pub mod transport {
    /// Readiness transitions, labelled by `state`
    pub const READINESS_TRANSITIONS_TOTAL: &str = "courier_transport_readiness_transitions_total";
    /// Inbound messages received from the transport
    pub const INBOUND_MESSAGES_TOTAL: &str = "courier_transport_inbound_messages_total";
}

/// Common label keys
pub mod labels {
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const TRANSPORT: &str = "transport";
    pub const STATE: &str = "state";
}

/// Histogram bucket boundaries
pub mod buckets {
    use once_cell::sync::Lazy;

    /// HTTP request duration buckets (in seconds)
    /// Covers 1ms to 60s
    pub static HTTP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
        ]
    });

    /// Transport send duration buckets (in seconds)
    /// Covers 10ms to the 30s send timeout
    pub static SEND_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0,
        ]
    });
}
