use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sidecar::DEFAULT_SIDECAR_PORT;

/// Settings for the WhatsApp Web transport (`[channels.whatsapp]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Session name the sidecar stores its login under.
    pub session_id: String,

    /// Directory where the sidecar persists the session between restarts.
    pub session_dir: PathBuf,

    /// Run the browser without a window.
    pub headless: bool,

    /// Extra browser flags passed through to the sidecar.
    pub browser_args: Vec<String>,

    /// Port of the sidecar WebSocket server.
    pub sidecar_port: u16,

    /// Directory containing the sidecar's `package.json`. Searched for when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_dir: Option<PathBuf>,

    /// Spawn and supervise the sidecar process. Disable when running it by hand.
    pub auto_start: bool,

    /// Connection attempts before giving up on reaching the sidecar.
    pub connect_attempts: u32,

    /// Seconds to wait before reconnecting after the sidecar connection drops.
    pub reconnect_delay_secs: u64,

    /// Seconds to wait for the sidecar to confirm a send.
    pub send_timeout_secs: u64,

    /// Automatic reply to a greeting.
    pub greeting: GreetingConfig,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            session_id: "courier".into(),
            session_dir: PathBuf::from("./whatsapp-session"),
            headless: true,
            browser_args: [
                "--no-sandbox",
                "--disable-setuid-sandbox",
                "--disable-dev-shm-usage",
                "--disable-gpu",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            sidecar_port: DEFAULT_SIDECAR_PORT,
            sidecar_dir: None,
            auto_start: true,
            connect_attempts: 10,
            reconnect_delay_secs: 5,
            send_timeout_secs: 30,
            greeting: GreetingConfig::default(),
        }
    }
}

/// Reply sent when an inbound message matches `trigger`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GreetingConfig {
    pub enabled: bool,
    /// Matched case-insensitively against the whole message body.
    pub trigger: String,
    pub reply: String,
}

impl Default for GreetingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: "hi".into(),
            reply: "👋 Hello! I’m your WhatsApp bot!".into(),
        }
    }
}

impl GreetingConfig {
    /// The reply for `body`, if it is the trigger.
    pub fn reply_for(&self, body: &str) -> Option<&str> {
        (self.enabled && body.eq_ignore_ascii_case(&self.trigger))
            .then_some(self.reply.as_str())
    }
}
