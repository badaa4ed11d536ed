#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Drives `WhatsAppTransport` against an in-process WebSocket server that
//! speaks the sidecar protocol.

use std::{sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    tokio::{net::TcpListener, sync::mpsc},
    tokio_tungstenite::{accept_async, tungstenite::Message},
};

use {
    courier_channels::{DeliveryConfig, DeliveryDriver, DispatchOutcome, Error, Transport},
    courier_whatsapp::{
        WhatsAppConfig, WhatsAppTransport,
        types::{GatewayMessage, SidecarMessage},
    },
};

const WAIT: Duration = Duration::from_secs(5);

/// Accepts one connection. Answers `send_text` with success, except text
/// `"fail"` (reported failure) and `"hang"` (never answered).
struct FakeSidecar {
    port: u16,
    received: mpsc::UnboundedReceiver<GatewayMessage>,
    /// `None` closes the connection.
    push: mpsc::UnboundedSender<Option<SidecarMessage>>,
}

impl FakeSidecar {
    async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (push, mut push_rx) = mpsc::unbounded_channel::<Option<SidecarMessage>>();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut sink, mut source) = accept_async(stream).await.unwrap().split();
            loop {
                tokio::select! {
                    frame = source.next() => {
                        let Some(Ok(Message::Text(text))) = frame else { break };
                        let message: GatewayMessage = serde_json::from_str(text.as_str()).unwrap();
                        if let GatewayMessage::SendText { request_id, text, .. } = &message
                            && text != "hang"
                        {
                            let failed = text == "fail";
                            let reply = SidecarMessage::SendResult {
                                request_id: request_id.clone(),
                                success: !failed,
                                error: failed.then(|| "rejected by fake".to_string()),
                            };
                            let json = serde_json::to_string(&reply).unwrap();
                            sink.send(Message::Text(json.into())).await.unwrap();
                        }
                        let _ = received_tx.send(message);
                    },
                    pushed = push_rx.recv() => match pushed {
                        Some(Some(message)) => {
                            let json = serde_json::to_string(&message).unwrap();
                            sink.send(Message::Text(json.into())).await.unwrap();
                        },
                        _ => {
                            let _ = sink.close().await;
                            break;
                        },
                    },
                }
            }
        });

        Self {
            port,
            received,
            push,
        }
    }

    async fn next(&mut self) -> GatewayMessage {
        tokio::time::timeout(WAIT, self.received.recv())
            .await
            .expect("sidecar got nothing")
            .expect("sidecar channel closed")
    }

    fn connected(&self) {
        self.push
            .send(Some(SidecarMessage::Connected {
                session_id: "render-bot".into(),
                phone_number: Some("15550000000".into()),
            }))
            .unwrap();
    }
}

async fn start_transport(fake: &mut FakeSidecar, send_timeout_secs: u64) -> Arc<WhatsAppTransport> {
    let transport = Arc::new(WhatsAppTransport::new(WhatsAppConfig {
        session_id: "render-bot".into(),
        sidecar_port: fake.port,
        auto_start: false,
        connect_attempts: 3,
        reconnect_delay_secs: 3600,
        send_timeout_secs,
        ..Default::default()
    }));
    transport.start().await.unwrap();

    match fake.next().await {
        GatewayMessage::Login { session_id, .. } => assert_eq!(session_id, "render-bot"),
        other => panic!("expected login, got {other:?}"),
    }
    transport
}

async fn wait_ready(transport: &WhatsAppTransport, ready: bool) {
    let mut rx = transport.readiness();
    tokio::time::timeout(WAIT, rx.wait_for(|r| r.is_ready() == ready))
        .await
        .expect("readiness did not change")
        .unwrap();
}

#[tokio::test]
async fn connected_session_sends_and_reports_failures() {
    let mut fake = FakeSidecar::spawn().await;
    let transport = start_transport(&mut fake, 30).await;
    assert!(!transport.is_ready());

    fake.connected();
    wait_ready(&transport, true).await;

    transport.send_text("15551234567@c.us", "hello").await.unwrap();
    match fake.next().await {
        GatewayMessage::SendText { to, text, .. } => {
            assert_eq!(to, "15551234567@c.us");
            assert_eq!(text, "hello");
        },
        other => panic!("expected send_text, got {other:?}"),
    }

    let err = transport.send_text("15551234567@c.us", "fail").await.unwrap_err();
    assert!(matches!(err, Error::SendFailed { ref reason, .. } if reason == "rejected by fake"));
}

#[tokio::test]
async fn greeting_gets_auto_reply() {
    let mut fake = FakeSidecar::spawn().await;
    let _transport = start_transport(&mut fake, 30).await;
    fake.connected();

    fake.push
        .send(Some(SidecarMessage::InboundMessage {
            session_id: "render-bot".into(),
            from: "15557654321@c.us".into(),
            sender_name: None,
            body: "Hi".into(),
        }))
        .unwrap();

    match fake.next().await {
        GatewayMessage::SendText { to, text, .. } => {
            assert_eq!(to, "15557654321@c.us");
            assert_eq!(text, "👋 Hello! I’m your WhatsApp bot!");
        },
        other => panic!("expected greeting, got {other:?}"),
    }
}

#[tokio::test]
async fn lost_connection_fails_in_flight_send_and_goes_unready() {
    let mut fake = FakeSidecar::spawn().await;
    let transport = start_transport(&mut fake, 30).await;
    fake.connected();
    wait_ready(&transport, true).await;

    let sender = Arc::clone(&transport);
    let in_flight =
        tokio::spawn(async move { sender.send_text("15551234567@c.us", "hang").await });
    assert!(matches!(fake.next().await, GatewayMessage::SendText { .. }));

    fake.push.send(None).unwrap();

    let result = tokio::time::timeout(WAIT, in_flight).await.unwrap().unwrap();
    assert!(matches!(result, Err(Error::Unavailable { .. })));
    wait_ready(&transport, false).await;
}

#[tokio::test]
async fn unanswered_send_times_out() {
    let mut fake = FakeSidecar::spawn().await;
    let transport = start_transport(&mut fake, 1).await;
    fake.connected();
    wait_ready(&transport, true).await;

    let err = transport.send_text("15551234567@c.us", "hang").await.unwrap_err();
    assert!(matches!(err, Error::SendFailed { .. }));
}

#[tokio::test]
async fn driver_flushes_queue_when_session_connects() {
    let mut fake = FakeSidecar::spawn().await;
    let transport = start_transport(&mut fake, 30).await;
    let driver = DeliveryDriver::new(transport.clone(), DeliveryConfig::default());
    let _watcher = driver.watch_readiness();

    let outcome = driver.dispatch("15551234567", "queued while offline").await;
    assert_eq!(outcome, DispatchOutcome::Queued { depth: 1 });

    fake.connected();
    match fake.next().await {
        GatewayMessage::SendText { to, text, .. } => {
            assert_eq!(to, "15551234567@c.us");
            assert_eq!(text, "queued while offline");
        },
        other => panic!("expected flushed send, got {other:?}"),
    }
    driver.shutdown();
}
