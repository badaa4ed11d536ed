/// Crate-wide result type for delivery operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed delivery errors shared by the driver and transport implementations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The transport cannot take sends right now (disconnected, logging in).
    #[error("transport unavailable: {message}")]
    Unavailable { message: String },

    /// The transport rejected or failed a send.
    #[error("send to {address} failed: {reason}")]
    SendFailed { address: String, reason: String },
}

impl Error {
    #[must_use]
    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn send_failed(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SendFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}
