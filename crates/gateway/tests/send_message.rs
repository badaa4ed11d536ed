#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end tests of the HTTP boundary against a stub transport.

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    tokio::{net::TcpListener, sync::watch},
};

use {
    courier_channels::{
        DeliveryConfig, DeliveryDriver, Readiness, ReadinessSignal, Result, Transport,
    },
    courier_gateway::{GatewayState, build_gateway_app},
};

#[derive(Default)]
struct StubTransport {
    readiness: ReadinessSignal,
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for StubTransport {
    fn id(&self) -> &str {
        "stub"
    }

    fn is_ready(&self) -> bool {
        self.readiness.current().is_ready()
    }

    fn readiness(&self) -> watch::Receiver<Readiness> {
        self.readiness.subscribe()
    }

    fn normalize_address(&self, recipient: &str) -> String {
        courier_channels::normalize_address(recipient, "@c.us")
    }

    async fn send_text(&self, address: &str, payload: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((address.to_string(), payload.to_string()));
        Ok(())
    }
}

struct TestServer {
    addr: SocketAddr,
    transport: Arc<StubTransport>,
    driver: Arc<DeliveryDriver>,
}

/// Spin up a gateway on an ephemeral port.
async fn start_test_server() -> TestServer {
    let transport = Arc::new(StubTransport::default());
    let driver = DeliveryDriver::new(transport.clone(), DeliveryConfig::default());
    driver.watch_readiness();
    let app = build_gateway_app(GatewayState::new(Arc::clone(&driver)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    TestServer {
        addr,
        transport,
        driver,
    }
}

async fn post_json(addr: SocketAddr, body: &str) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("http://{addr}/send-message"))
        .header("content-type", "application/json")
        .body(body.to_string())
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within a second");
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let server = start_test_server().await;

    for body in [
        r#"{"number":"15551234567"}"#,
        r#"{"message":"hello"}"#,
        r#"{"number":"","message":"hello"}"#,
        "{}",
    ] {
        let (status, json) = post_json(server.addr, body).await;
        assert_eq!(status, 400, "body {body}");
        assert_eq!(json["accepted"], false);
        assert_eq!(json["error"], "number and message are required");
    }
    assert_eq!(server.driver.queue_depth(), 0);
}

#[tokio::test]
async fn malformed_json_is_rejected_with_same_shape() {
    let server = start_test_server().await;
    let (status, json) = post_json(server.addr, "not json").await;
    assert_eq!(status, 400);
    assert_eq!(json["accepted"], false);
}

#[tokio::test]
async fn accepted_while_unready_then_delivered_on_ready() {
    let server = start_test_server().await;

    let (status, json) =
        post_json(server.addr, r#"{"number":"15551234567","message":"hello"}"#).await;
    assert_eq!(status, 202);
    assert_eq!(json, serde_json::json!({"accepted": true}));

    eventually(|| server.driver.queue_depth() == 1).await;
    assert!(server.transport.sent.lock().unwrap().is_empty());

    server.transport.readiness.set(Readiness::Ready);
    eventually(|| server.transport.sent.lock().unwrap().len() == 1).await;
    assert_eq!(server.transport.sent.lock().unwrap()[0], (
        "15551234567@c.us".to_string(),
        "hello".to_string()
    ));
    assert_eq!(server.driver.queue_depth(), 0);
}

#[tokio::test]
async fn health_reports_delivery_state() {
    let server = start_test_server().await;
    post_json(server.addr, r#"{"recipient":"1555","payload":"x"}"#).await;
    eventually(|| server.driver.queue_depth() == 1).await;

    let json: serde_json::Value = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["transport"], "stub");
    assert_eq!(json["ready"], false);
    assert_eq!(json["queued"], 1);
    assert_eq!(json["pending_retries"], 0);
    assert!(json.get("session").is_none());
}

#[tokio::test]
async fn root_answers_plain_text() {
    let server = start_test_server().await;
    let resp = reqwest::get(format!("http://{}/", server.addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.text().await.unwrap().contains("courier"));
}
