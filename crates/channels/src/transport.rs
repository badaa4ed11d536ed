use {async_trait::async_trait, serde::Serialize, tokio::sync::watch};

use crate::Result;

/// Whether a transport can accept sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Not connected or not authenticated yet. Initial state.
    #[default]
    Unready,
    /// Connected and able to send.
    Ready,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Chat transport as seen by the delivery driver.
///
/// The driver never owns the transport's lifecycle (connect, login, teardown);
/// it only observes readiness and asks for sends.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport identifier (e.g. "whatsapp-web").
    fn id(&self) -> &str;

    /// Current readiness.
    fn is_ready(&self) -> bool;

    /// Subscribe to readiness changes.
    fn readiness(&self) -> watch::Receiver<Readiness>;

    /// Map a submitted recipient to the address form the transport needs.
    /// Must be idempotent. Identity by default.
    fn normalize_address(&self, recipient: &str) -> String {
        recipient.to_string()
    }

    /// Send `payload` to an already-normalized `address`.
    async fn send_text(&self, address: &str, payload: &str) -> Result<()>;
}

/// Publishing side of a transport's readiness, for transport implementations.
///
/// Subscribers are only woken when the state actually changes.
#[derive(Debug)]
pub struct ReadinessSignal {
    tx: watch::Sender<Readiness>,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(Readiness::Unready),
        }
    }

    pub fn current(&self) -> Readiness {
        *self.tx.borrow()
    }

    /// Set the state. Returns `true` when it differs from the previous one.
    pub fn set(&self, readiness: Readiness) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == readiness {
                false
            } else {
                *current = readiness;
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.tx.subscribe()
    }
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self::new()
    }
}
