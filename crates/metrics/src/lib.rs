//! Metrics collection and export for courier.
//!
//! All recording goes through the `metrics` crate facade. With the
//! `prometheus` feature the recorder renders Prometheus text for `/metrics`;
//! without it every macro call is a no-op.
//!
//! ```rust,ignore
//! use courier_metrics::{counter, delivery};
//!
//! counter!(delivery::SENT_TOTAL, "transport" => "whatsapp-web").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
