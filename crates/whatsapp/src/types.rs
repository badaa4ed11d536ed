//! JSON protocol spoken with the sidecar over its WebSocket.

use serde::{Deserialize, Serialize};

/// Courier -> sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayMessage {
    /// Start (or resume) a WhatsApp Web session.
    Login {
        session_id: String,
        session_dir: String,
        headless: bool,
        browser_args: Vec<String>,
    },
    /// Send a text message. Answered by [`SidecarMessage::SendResult`].
    SendText {
        request_id: String,
        to: String,
        text: String,
    },
}

/// Sidecar -> courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SidecarMessage {
    /// A login QR code is waiting to be scanned.
    Qr { session_id: String, qr: String },
    Connected {
        session_id: String,
        #[serde(default)]
        phone_number: Option<String>,
    },
    Disconnected {
        session_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    LoggedOut { session_id: String },
    InboundMessage {
        session_id: String,
        from: String,
        #[serde(default)]
        sender_name: Option<String>,
        body: String,
    },
    SendResult {
        request_id: String,
        success: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default)]
        session_id: Option<String>,
        error: String,
    },
}

/// Session state as last reported by the sidecar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Login sent, no QR code yet.
    WaitingForQr,
    QrReceived { qr: String },
    Connected { phone_number: Option<String> },
}
