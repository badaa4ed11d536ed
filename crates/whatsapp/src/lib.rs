//! WhatsApp Web transport for courier.
//!
//! Implements [`courier_channels::Transport`] on top of a Node.js sidecar that
//! drives WhatsApp Web. Courier manages the sidecar process and talks to it
//! over a local WebSocket.

pub mod config;
pub mod process;
pub mod sidecar;
pub mod transport;
pub mod types;

pub use {
    config::{GreetingConfig, WhatsAppConfig},
    process::{SidecarConfig, SidecarProcess, find_sidecar_dir, start_sidecar},
    sidecar::{DEFAULT_SIDECAR_PORT, SidecarHandle},
    transport::{ADDRESS_SUFFIX, WhatsAppTransport},
    types::ConnectionState,
};
