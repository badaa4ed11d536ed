use std::sync::Arc;

use {courier_channels::DeliveryDriver, courier_whatsapp::WhatsAppTransport};

#[cfg(feature = "metrics")]
use courier_metrics::MetricsHandle;

/// Everything the HTTP handlers need.
pub struct GatewayState {
    pub version: String,
    pub driver: Arc<DeliveryDriver>,
    /// Set when the driver runs over WhatsApp Web, for session details in `/health`.
    pub whatsapp: Option<Arc<WhatsAppTransport>>,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn new(driver: Arc<DeliveryDriver>) -> Arc<Self> {
        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            driver,
            whatsapp: None,
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        })
    }
}
