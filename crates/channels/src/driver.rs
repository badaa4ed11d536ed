//! Delivery driver: send now, queue until ready, or retry later.

use std::{sync::Arc, time::Duration};

use {
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, delivery as delivery_metrics, gauge, histogram, labels};

use crate::{
    message::PendingMessage,
    queue::DispatchQueue,
    retry::{RetryScheduler, RetryTicket},
    transport::Transport,
};

/// Retry behavior for failed sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Fixed delay between a failed send and its retry.
    pub retry_delay: Duration,
    /// Stop after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

impl From<&courier_config::DeliverySettings> for DeliveryConfig {
    fn from(settings: &courier_config::DeliverySettings) -> Self {
        Self {
            retry_delay: settings.retry_delay(),
            max_attempts: settings.max_attempts,
        }
    }
}

/// What a single dispatch attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Transport not ready; parked in the dispatch queue at this depth.
    Queued { depth: usize },
    /// Transport accepted the message.
    Sent,
    /// Send failed; `next_attempt` will run after the retry delay.
    RetryScheduled {
        next_attempt: u32,
        ticket: RetryTicket,
    },
    /// Send failed and the configured attempt cap was reached.
    GaveUp { attempts: u32 },
}

/// The single path every outbound message takes.
///
/// Owns the dispatch queue and the retry scheduler; holds a shared handle to
/// the transport without owning its lifecycle.
pub struct DeliveryDriver {
    transport: Arc<dyn Transport>,
    queue: DispatchQueue,
    retries: RetryScheduler,
    config: DeliveryConfig,
    shutdown: CancellationToken,
}

impl DeliveryDriver {
    pub fn new(transport: Arc<dyn Transport>, config: DeliveryConfig) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        Arc::new(Self {
            transport,
            queue: DispatchQueue::new(),
            retries: RetryScheduler::with_cancellation(shutdown.child_token()),
            config,
            shutdown,
        })
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// Messages waiting for the transport to become ready.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Retries waiting on their timer.
    pub fn pending_retries(&self) -> usize {
        self.retries.pending()
    }

    /// Send `payload` to `recipient`, or queue it if the transport is not
    /// ready. A failed send schedules one retry of this same dispatch after
    /// the configured delay and returns without waiting for it.
    pub async fn dispatch(
        self: &Arc<Self>,
        recipient: impl Into<String>,
        payload: impl Into<String>,
    ) -> DispatchOutcome {
        #[cfg(feature = "metrics")]
        counter!(delivery_metrics::DISPATCHED_TOTAL, labels::TRANSPORT => self.transport.id().to_string())
            .increment(1);

        self.dispatch_message(PendingMessage::new(recipient, payload), 1)
            .await
    }

    /// Drain the queue and re-dispatch every entry in arrival order.
    ///
    /// Called on each transition into ready. A message that arrives while the
    /// flush runs may be sent before, between or after the flushed ones.
    /// Returns how many messages were drained.
    pub async fn on_transport_ready(self: &Arc<Self>) -> usize {
        let drained = self.queue.drain_all();
        if drained.is_empty() {
            debug!(transport = self.transport.id(), "transport ready, queue empty");
            return 0;
        }

        let count = drained.len();
        info!(
            transport = self.transport.id(),
            count, "transport ready, flushing queued messages"
        );
        #[cfg(feature = "metrics")]
        {
            counter!(delivery_metrics::FLUSHES_TOTAL).increment(1);
            gauge!(delivery_metrics::QUEUE_DEPTH).set(self.queue.len() as f64);
        }

        for message in drained {
            self.dispatch_message(message, 1).await;
        }
        count
    }

    /// Follow the transport's readiness and flush on every change that lands
    /// on ready (and once at start if it is already ready).
    ///
    /// The task ends when the transport drops its readiness sender or the
    /// driver shuts down.
    pub fn watch_readiness(self: &Arc<Self>) -> JoinHandle<()> {
        let driver = Arc::clone(self);
        let mut readiness = self.transport.readiness();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            loop {
                let current = *readiness.borrow_and_update();
                if current.is_ready() {
                    driver.on_transport_ready().await;
                }

                tokio::select! {
                    changed = readiness.changed() => {
                        if changed.is_err() {
                            debug!(transport = driver.transport.id(), "readiness sender dropped");
                            break;
                        }
                    },
                    () = shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Cancel one scheduled retry. Returns `false` if it already ran.
    pub fn cancel_retry(&self, ticket: RetryTicket) -> bool {
        self.retries.cancel(ticket)
    }

    /// Cancel all pending retries and stop the readiness watcher. Queued
    /// messages stay queued.
    pub fn shutdown(&self) {
        let pending = self.retries.pending();
        self.shutdown.cancel();
        self.retries.cancel_all();
        info!(
            transport = self.transport.id(),
            pending_retries = pending,
            queued = self.queue.len(),
            "delivery driver shut down"
        );
    }

    async fn dispatch_message(
        self: &Arc<Self>,
        message: PendingMessage,
        attempt: u32,
    ) -> DispatchOutcome {
        if !self.transport.is_ready() {
            let depth = self.queue.enqueue(message);
            info!(
                transport = self.transport.id(),
                depth, "transport not ready, message queued"
            );
            #[cfg(feature = "metrics")]
            {
                counter!(delivery_metrics::QUEUED_TOTAL).increment(1);
                gauge!(delivery_metrics::QUEUE_DEPTH).set(depth as f64);
            }
            // Readiness may have flipped after the check, with the watcher's
            // drain already done.
            if self.transport.is_ready() {
                debug!(
                    transport = self.transport.id(),
                    "transport became ready while queueing, flushing"
                );
                self.flush_soon();
            }
            return DispatchOutcome::Queued { depth };
        }

        let address = self.transport.normalize_address(message.recipient());
        #[cfg(feature = "metrics")]
        let started = std::time::Instant::now();
        let result = self
            .transport
            .send_text(&address, message.payload())
            .await;
        #[cfg(feature = "metrics")]
        histogram!(delivery_metrics::SEND_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                info!(
                    transport = self.transport.id(),
                    to = %address,
                    attempt,
                    "message sent"
                );
                #[cfg(feature = "metrics")]
                counter!(delivery_metrics::SENT_TOTAL).increment(1);
                DispatchOutcome::Sent
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(delivery_metrics::SEND_FAILURES_TOTAL).increment(1);

                if self.config.max_attempts.is_some_and(|max| attempt >= max) {
                    error!(
                        transport = self.transport.id(),
                        to = %address,
                        attempt,
                        error = %e,
                        "send failed, giving up"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(delivery_metrics::GAVE_UP_TOTAL).increment(1);
                    return DispatchOutcome::GaveUp { attempts: attempt };
                }

                let next_attempt = attempt.saturating_add(1);
                let ticket = self.schedule_retry(message, next_attempt);
                warn!(
                    transport = self.transport.id(),
                    to = %address,
                    attempt,
                    retry = ticket.id(),
                    retry_in = ?self.config.retry_delay,
                    error = %e,
                    "send failed, retry scheduled"
                );
                #[cfg(feature = "metrics")]
                counter!(delivery_metrics::RETRIES_SCHEDULED_TOTAL).increment(1);
                DispatchOutcome::RetryScheduled {
                    next_attempt,
                    ticket,
                }
            },
        }
    }

    fn schedule_retry(self: &Arc<Self>, message: PendingMessage, attempt: u32) -> RetryTicket {
        let driver = Arc::clone(self);
        self.retries
            .schedule(self.config.retry_delay, async move {
                driver.dispatch_message(message, attempt).await;
            })
    }

    fn flush_soon(self: &Arc<Self>) {
        let driver = Arc::clone(self);
        tokio::spawn(async move {
            driver.on_transport_ready().await;
        });
    }
}
