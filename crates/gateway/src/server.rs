use std::{net::SocketAddr, sync::Arc};

use {
    anyhow::Context,
    axum::{
        Router,
        extract::State,
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    courier_channels::{DeliveryConfig, DeliveryDriver, Transport},
    courier_config::CourierConfig,
    courier_whatsapp::WhatsAppTransport,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{error, info, warn},
};

use crate::{state::GatewayState, submit::send_message_handler};

// ── Shared app state ─────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<GatewayState>,
}

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/send-message", post(send_message_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route(
        "/metrics",
        get(crate::metrics_routes::prometheus_metrics_handler),
    );

    #[cfg(feature = "metrics")]
    let router = router.route_layer(axum::middleware::from_fn(
        crate::metrics_middleware::http_metrics_middleware,
    ));

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(AppState { gateway: state })
}

/// Start the WhatsApp transport, the delivery driver and the HTTP server, and
/// run until Ctrl-C or SIGTERM.
pub async fn start_gateway(config: CourierConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.bind, config.server.port
            )
        })?;

    #[cfg(feature = "metrics")]
    let metrics_handle = courier_metrics::init_metrics(courier_metrics::MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })
    .map_err(|e| warn!(error = %e, "metrics recorder not installed"))
    .ok();

    let whatsapp = Arc::new(WhatsAppTransport::from_value(
        config.channels.whatsapp.clone(),
    )?);
    let delivery = DeliveryConfig::from(&config.delivery);
    let driver = DeliveryDriver::new(whatsapp.clone(), delivery.clone());
    let watcher = driver.watch_readiness();

    // Login can take a while (QR scan); requests queue in the meantime.
    let starting = Arc::clone(&whatsapp);
    tokio::spawn(async move {
        if let Err(e) = starting.start().await {
            error!(error = %e, "failed to start WhatsApp transport");
        }
    });

    let state = Arc::new(GatewayState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        driver: Arc::clone(&driver),
        whatsapp: Some(Arc::clone(&whatsapp)),
        #[cfg(feature = "metrics")]
        metrics_handle,
    });
    let app = build_gateway_app(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let lines = [
        format!("courier v{}", env!("CARGO_PKG_VERSION")),
        format!("listening on http://{addr}"),
        format!("transport: {}", whatsapp.id()),
        format!(
            "retry: every {}ms, {}",
            delivery.retry_delay.as_millis(),
            match delivery.max_attempts {
                Some(n) => format!("at most {n} attempts"),
                None => "until delivered".to_string(),
            }
        ),
        format!(
            "config: {}",
            courier_config::find_or_default_config_path().display()
        ),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        queued = driver.queue_depth(),
        pending_retries = driver.pending_retries(),
        "shutting down"
    );
    driver.shutdown();
    watcher.abort();
    if let Err(e) = whatsapp.stop().await {
        warn!(error = %e, "failed to stop WhatsApp transport cleanly");
    }
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("SIGTERM received"),
                    _ = tokio::signal::ctrl_c() => info!("Ctrl-C received"),
                }
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            },
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl-C received");
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn root_handler() -> &'static str {
    "courier is running"
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = &state.gateway;
    let transport = gateway.driver.transport();
    let mut body = serde_json::json!({
        "status": "ok",
        "version": gateway.version,
        "transport": transport.id(),
        "ready": transport.is_ready(),
        "queued": gateway.driver.queue_depth(),
        "pending_retries": gateway.driver.pending_retries(),
    });
    if let Some(whatsapp) = &gateway.whatsapp {
        body["session"] = serde_json::json!(whatsapp.connection_state());
    }
    Json(body)
}
