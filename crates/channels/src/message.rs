/// A send request waiting for delivery.
///
/// Built once when a request reaches the driver and never mutated afterwards;
/// it is consumed by a successful send or carried along by a scheduled retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMessage {
    recipient: String,
    payload: String,
}

impl PendingMessage {
    pub fn new(recipient: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            payload: payload.into(),
        }
    }

    /// Recipient as submitted, before transport address normalization.
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}
