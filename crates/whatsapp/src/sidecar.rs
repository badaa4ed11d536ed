//! WebSocket client for the sidecar.
//!
//! One reader task parses [`SidecarMessage`]s and resolves pending sends by
//! `request_id`; one writer task drains an outgoing channel into the socket.
//! Everything else is handed to the caller's handler.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    futures::{SinkExt, StreamExt},
    tokio::sync::{mpsc, oneshot},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use crate::types::{GatewayMessage, SidecarMessage};

/// Port the sidecar listens on unless configured otherwise.
pub const DEFAULT_SIDECAR_PORT: u16 = 18_790;

const OUTGOING_BUFFER: usize = 64;
const CONNECT_BACKOFF: Duration = Duration::from_millis(500);

/// Receives every sidecar message except send results.
pub type MessageHandler = Arc<dyn Fn(SidecarMessage) + Send + Sync>;

#[derive(Debug)]
struct SendReply {
    success: bool,
    error: Option<String>,
}

type PendingSends = Arc<Mutex<HashMap<String, oneshot::Sender<SendReply>>>>;

/// Connection to a running sidecar. Cheap to clone.
#[derive(Clone)]
pub struct SidecarHandle {
    outgoing: mpsc::Sender<GatewayMessage>,
    pending: PendingSends,
    connected: Arc<AtomicBool>,
}

impl SidecarHandle {
    /// Connect to the sidecar on `127.0.0.1:port`.
    ///
    /// The returned receiver resolves once the connection is gone; by then
    /// every in-flight send has failed.
    pub async fn connect(
        port: u16,
        handler: MessageHandler,
    ) -> Result<(Self, oneshot::Receiver<()>)> {
        let url = format!("ws://127.0.0.1:{port}");
        let (stream, _) = connect_async(url.as_str())
            .await
            .with_context(|| format!("failed to connect to WhatsApp sidecar at {url}"))?;
        let (mut sink, mut reader) = stream.split();

        let (outgoing, mut outgoing_rx) = mpsc::channel::<GatewayMessage>(OUTGOING_BUFFER);
        let pending: PendingSends = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));
        let (closed_tx, closed_rx) = oneshot::channel();

        let writer = tokio::spawn(async move {
            while let Some(message) = outgoing_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "failed to encode sidecar message");
                        continue;
                    },
                };
                if let Err(e) = sink.send(Message::Text(json.into())).await {
                    warn!(error = %e, "sidecar write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader_pending = Arc::clone(&pending);
        let reader_connected = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<SidecarMessage>(text.as_str()) {
                            Ok(SidecarMessage::SendResult {
                                request_id,
                                success,
                                error,
                            }) => {
                                let waiter = lock(&reader_pending).remove(&request_id);
                                match waiter {
                                    Some(tx) => {
                                        let _ = tx.send(SendReply { success, error });
                                    },
                                    None => debug!(%request_id, "send_result for unknown request"),
                                }
                            },
                            Ok(message) => handler(message),
                            Err(e) => warn!(error = %e, "unparseable sidecar message"),
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        debug!(?frame, "sidecar closed the connection");
                        break;
                    },
                    Ok(_) => {},
                    Err(e) => {
                        warn!(error = %e, "sidecar read failed");
                        break;
                    },
                }
            }

            reader_connected.store(false, Ordering::SeqCst);
            writer.abort();
            // Dropping the senders fails every waiting send.
            let dropped = lock(&reader_pending).drain().count();
            if dropped > 0 {
                warn!(in_flight = dropped, "sidecar connection lost with sends in flight");
            }
            let _ = closed_tx.send(());
        });

        info!(port, "connected to WhatsApp sidecar");
        Ok((
            Self {
                outgoing,
                pending,
                connected,
            },
            closed_rx,
        ))
    }

    /// [`connect`](Self::connect), retried while the sidecar is still starting.
    pub async fn connect_with_retry(
        port: u16,
        handler: MessageHandler,
        attempts: u32,
    ) -> Result<(Self, oneshot::Receiver<()>)> {
        let attempts = attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Self::connect(port, Arc::clone(&handler)).await {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    debug!(attempt, attempts, error = %e, "sidecar not reachable yet");
                    last_error = Some(e);
                },
            }
            if attempt < attempts {
                tokio::time::sleep(CONNECT_BACKOFF * attempt).await;
            }
        }
        match last_error {
            Some(e) => Err(e.context(format!("gave up after {attempts} attempts"))),
            None => bail!("no connection attempts made"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue a message for the sidecar.
    pub async fn send(&self, message: GatewayMessage) -> Result<()> {
        if !self.is_connected() {
            bail!("sidecar connection is closed");
        }
        self.outgoing
            .send(message)
            .await
            .context("sidecar connection is closed")
    }

    /// Send a text message and wait for the sidecar to confirm it.
    pub async fn send_text(
        &self,
        to: &str,
        text: &str,
        timeout: Duration,
    ) -> courier_channels::Result<()> {
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(request_id.clone(), tx);

        let request = GatewayMessage::SendText {
            request_id: request_id.clone(),
            to: to.to_string(),
            text: text.to_string(),
        };
        if let Err(e) = self.send(request).await {
            lock(&self.pending).remove(&request_id);
            return Err(courier_channels::Error::unavailable(e));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(SendReply { success: true, .. })) => Ok(()),
            Ok(Ok(SendReply { error, .. })) => Err(courier_channels::Error::send_failed(
                to,
                error.unwrap_or_else(|| "sidecar reported failure".into()),
            )),
            Ok(Err(_)) => Err(courier_channels::Error::unavailable(
                "sidecar connection closed before the send completed",
            )),
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                Err(courier_channels::Error::send_failed(
                    to,
                    format!("no confirmation within {}s", timeout.as_secs()),
                ))
            },
        }
    }
}

fn lock(pending: &PendingSends) -> MutexGuard<'_, HashMap<String, oneshot::Sender<SendReply>>> {
    pending.lock().unwrap_or_else(|e| e.into_inner())
}
