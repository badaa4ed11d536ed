//! Outbound dispatch and durability layer.
//!
//! A [`DeliveryDriver`] is the single gateway for outbound sends. It sends
//! through a [`Transport`] when the transport is ready, parks messages in a
//! [`DispatchQueue`] when it is not, flushes that queue on every transition
//! into [`Readiness::Ready`], and retries failed sends on a fixed delay via a
//! [`RetryScheduler`].

pub mod address;
pub mod driver;
pub mod error;
pub mod message;
pub mod queue;
pub mod retry;
pub mod transport;

pub use {
    address::normalize_address,
    driver::{DeliveryConfig, DeliveryDriver, DispatchOutcome},
    error::{Error, Result},
    message::PendingMessage,
    queue::DispatchQueue,
    retry::{RetryScheduler, RetryTicket},
    transport::{Readiness, ReadinessSignal, Transport},
};
