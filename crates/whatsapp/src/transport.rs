//! [`Transport`] implementation backed by the sidecar.

use std::{
    sync::{Arc, Mutex, RwLock},
    time::Duration,
};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    courier_channels::{Readiness, ReadinessSignal, Transport, normalize_address},
    tokio::{sync::oneshot, task::JoinHandle},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use courier_metrics::{counter, labels, transport as transport_metrics};

use crate::{
    config::WhatsAppConfig,
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{MessageHandler, SidecarHandle},
    types::{ConnectionState, GatewayMessage, SidecarMessage},
};

/// Suffix WhatsApp Web uses for individual chats.
pub const ADDRESS_SUFFIX: &str = "@c.us";

const TRANSPORT_ID: &str = "whatsapp-web";

struct Inner {
    config: WhatsAppConfig,
    readiness: ReadinessSignal,
    state: RwLock<ConnectionState>,
    sidecar: tokio::sync::RwLock<Option<SidecarHandle>>,
    process: tokio::sync::Mutex<Option<SidecarProcess>>,
}

/// WhatsApp Web transport.
///
/// Readiness follows the sidecar's session events: `connected` makes it
/// ready, `disconnected`, `logged_out` and a lost sidecar connection make it
/// unready. After a lost connection the transport keeps reconnecting every
/// `reconnect_delay_secs` until stopped.
pub struct WhatsAppTransport {
    inner: Arc<Inner>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppTransport {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                readiness: ReadinessSignal::new(),
                state: RwLock::new(ConnectionState::Disconnected),
                sidecar: tokio::sync::RwLock::new(None),
                process: tokio::sync::Mutex::new(None),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// Build from the raw `[channels.whatsapp]` table. `null` means defaults.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config = if value.is_null() {
            WhatsAppConfig::default()
        } else {
            serde_json::from_value(value).context("invalid [channels.whatsapp] config")?
        };
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &WhatsAppConfig {
        &self.inner.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    /// The QR code waiting to be scanned, if any.
    pub fn qr_code(&self) -> Option<String> {
        match self.connection_state() {
            ConnectionState::QrReceived { qr } => Some(qr),
            _ => None,
        }
    }

    /// Start the sidecar (when `auto_start`), connect to it and log in.
    ///
    /// Returns once the login request is sent. Readiness flips later, when the
    /// sidecar reports the session as connected.
    pub async fn start(&self) -> Result<()> {
        let closed = Arc::clone(&self.inner).connect_and_login().await?;
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(inner.supervise(closed));
        if let Some(previous) = lock(&self.supervisor).replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Disconnect and stop the sidecar process. The saved session is kept.
    pub async fn stop(&self) -> Result<()> {
        if let Some(task) = lock(&self.supervisor).take() {
            task.abort();
        }
        self.inner.sidecar.write().await.take();
        self.inner
            .mark_disconnected(ConnectionState::Disconnected);

        if let Some(mut process) = self.inner.process.lock().await.take() {
            process.stop().await?;
        }
        Ok(())
    }

    /// Apply one sidecar message. Exposed for the sidecar's reader task.
    pub fn handle_sidecar_message(&self, message: SidecarMessage) {
        Arc::clone(&self.inner).handle_message(message);
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn id(&self) -> &str {
        TRANSPORT_ID
    }

    fn is_ready(&self) -> bool {
        self.inner.readiness.current().is_ready()
    }

    fn readiness(&self) -> tokio::sync::watch::Receiver<Readiness> {
        self.inner.readiness.subscribe()
    }

    fn normalize_address(&self, recipient: &str) -> String {
        normalize_address(recipient, ADDRESS_SUFFIX)
    }

    async fn send_text(&self, address: &str, payload: &str) -> courier_channels::Result<()> {
        let handle = self.inner.sidecar.read().await.clone().ok_or_else(|| {
            courier_channels::Error::unavailable("not connected to the WhatsApp sidecar")
        })?;
        handle
            .send_text(address, payload, self.inner.send_timeout())
            .await
    }
}

impl Inner {
    fn connection_state(&self) -> ConnectionState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.config.send_timeout_secs)
    }

    fn set_readiness(&self, readiness: Readiness) {
        if self.readiness.set(readiness) {
            info!(transport = TRANSPORT_ID, ?readiness, "transport readiness changed");
            #[cfg(feature = "metrics")]
            counter!(
                transport_metrics::READINESS_TRANSITIONS_TOTAL,
                labels::TRANSPORT => TRANSPORT_ID,
                labels::STATE => if readiness.is_ready() { "ready" } else { "unready" }
            )
            .increment(1);
        }
    }

    fn mark_disconnected(&self, state: ConnectionState) {
        self.set_state(state);
        self.set_readiness(Readiness::Unready);
    }

    async fn ensure_process_running(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if let Some(running) = process.as_mut() {
            if running.is_running() {
                return Ok(());
            }
            warn!("WhatsApp sidecar process died, restarting");
        }

        let sidecar_dir = find_sidecar_dir(self.config.sidecar_dir.as_deref())?;
        let spawned = start_sidecar(SidecarConfig {
            sidecar_dir,
            port: self.config.sidecar_port,
            session_dir: Some(self.config.session_dir.clone()),
        })
        .await?;
        *process = Some(spawned);
        Ok(())
    }

    async fn connect_and_login(self: Arc<Self>) -> Result<oneshot::Receiver<()>> {
        if self.config.auto_start {
            self.ensure_process_running().await?;
        }

        let weak = Arc::downgrade(&self);
        let handler: MessageHandler = Arc::new(move |message| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_message(message);
            }
        });
        let (handle, closed) = SidecarHandle::connect_with_retry(
            self.config.sidecar_port,
            handler,
            self.config.connect_attempts,
        )
        .await?;

        handle
            .send(GatewayMessage::Login {
                session_id: self.config.session_id.clone(),
                session_dir: self.config.session_dir.display().to_string(),
                headless: self.config.headless,
                browser_args: self.config.browser_args.clone(),
            })
            .await?;
        *self.sidecar.write().await = Some(handle);
        self.set_state(ConnectionState::WaitingForQr);
        info!(session = %self.config.session_id, "WhatsApp login requested");
        Ok(closed)
    }

    async fn supervise(self: Arc<Self>, mut closed: oneshot::Receiver<()>) {
        let delay = Duration::from_secs(self.config.reconnect_delay_secs);
        loop {
            let _ = (&mut closed).await;
            warn!("lost connection to WhatsApp sidecar");
            self.sidecar.write().await.take();
            self.mark_disconnected(ConnectionState::Disconnected);

            loop {
                tokio::time::sleep(delay).await;
                match Arc::clone(&self).connect_and_login().await {
                    Ok(next) => {
                        closed = next;
                        break;
                    },
                    Err(e) => warn!(error = %e, "reconnecting to WhatsApp sidecar failed"),
                }
            }
        }
    }

    fn handle_message(self: Arc<Self>, message: SidecarMessage) {
        match message {
            SidecarMessage::Qr { session_id, qr } => {
                info!(session = %session_id, "WhatsApp login QR code received, scan it to link the device");
                debug!(%qr, "QR payload");
                self.set_state(ConnectionState::QrReceived { qr });
            },
            SidecarMessage::Connected {
                session_id,
                phone_number,
            } => {
                info!(session = %session_id, ?phone_number, "WhatsApp Web connected");
                self.set_state(ConnectionState::Connected { phone_number });
                self.set_readiness(Readiness::Ready);
            },
            SidecarMessage::Disconnected { session_id, reason } => {
                warn!(session = %session_id, ?reason, "WhatsApp Web disconnected");
                self.mark_disconnected(ConnectionState::Disconnected);
            },
            SidecarMessage::LoggedOut { session_id } => {
                warn!(session = %session_id, "WhatsApp Web logged out");
                self.mark_disconnected(ConnectionState::Disconnected);
            },
            SidecarMessage::InboundMessage {
                session_id,
                from,
                sender_name,
                body,
            } => {
                debug!(session = %session_id, %from, ?sender_name, "inbound WhatsApp message");
                #[cfg(feature = "metrics")]
                counter!(
                    transport_metrics::INBOUND_MESSAGES_TOTAL,
                    labels::TRANSPORT => TRANSPORT_ID
                )
                .increment(1);

                if let Some(reply) = self.config.greeting.reply_for(&body) {
                    let reply = reply.to_string();
                    tokio::spawn(async move { self.send_greeting(from, reply).await });
                }
            },
            SidecarMessage::SendResult { request_id, .. } => {
                debug!(%request_id, "unmatched send_result");
            },
            SidecarMessage::Error { session_id, error } => {
                warn!(?session_id, %error, "WhatsApp sidecar error");
            },
        }
    }

    async fn send_greeting(&self, to: String, reply: String) {
        let Some(handle) = self.sidecar.read().await.clone() else {
            debug!(%to, "greeting dropped, sidecar gone");
            return;
        };
        match handle.send_text(&to, &reply, self.send_timeout()).await {
            Ok(()) => debug!(%to, "greeting sent"),
            Err(e) => warn!(%to, error = %e, "greeting reply failed"),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> WhatsAppTransport {
        WhatsAppTransport::new(WhatsAppConfig {
            auto_start: false,
            ..Default::default()
        })
    }

    #[test]
    fn addresses_get_chat_suffix_once() {
        let t = transport();
        let once = t.normalize_address("15551234567");
        assert_eq!(once, "15551234567@c.us");
        assert_eq!(t.normalize_address(&once), once);
    }

    #[tokio::test]
    async fn session_events_drive_readiness() {
        let t = transport();
        let mut rx = t.readiness();
        assert!(!t.is_ready());

        t.handle_sidecar_message(SidecarMessage::Qr {
            session_id: "courier".into(),
            qr: "2@xyz".into(),
        });
        assert_eq!(t.qr_code().as_deref(), Some("2@xyz"));
        assert!(!t.is_ready());

        t.handle_sidecar_message(SidecarMessage::Connected {
            session_id: "courier".into(),
            phone_number: Some("15551234567".into()),
        });
        assert!(t.is_ready());
        assert!(t.qr_code().is_none());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Readiness::Ready);

        t.handle_sidecar_message(SidecarMessage::Disconnected {
            session_id: "courier".into(),
            reason: Some("NAVIGATION".into()),
        });
        assert!(!t.is_ready());
        assert_eq!(t.connection_state(), ConnectionState::Disconnected);

        t.handle_sidecar_message(SidecarMessage::Connected {
            session_id: "courier".into(),
            phone_number: None,
        });
        t.handle_sidecar_message(SidecarMessage::LoggedOut {
            session_id: "courier".into(),
        });
        assert!(!t.is_ready());
    }

    #[tokio::test]
    async fn send_without_sidecar_is_unavailable() {
        let t = transport();
        let err = t.send_text("1@c.us", "x").await.unwrap_err();
        assert!(matches!(err, courier_channels::Error::Unavailable { .. }));
    }

    #[test]
    fn from_null_value_uses_defaults() {
        let t = WhatsAppTransport::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(t.config().send_timeout_secs, 30);
        assert!(WhatsAppTransport::from_value(serde_json::json!({"headless": "yes"})).is_err());
    }
}
