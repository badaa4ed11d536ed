//! HTTP surface of courier.
//!
//! Accepts send requests, hands them to the [`courier_channels::DeliveryDriver`]
//! and reports delivery health. Delivery itself happens after the response
//! is sent.

#[cfg(feature = "metrics")]
pub mod metrics_middleware;
#[cfg(feature = "prometheus")]
pub mod metrics_routes;
pub mod server;
pub mod state;
pub mod submit;

pub use {
    server::{AppState, build_gateway_app, start_gateway},
    state::GatewayState,
    submit::{SendMessageRequest, SubmitResponse, submit_message},
};
