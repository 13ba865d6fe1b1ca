//! Upgrade (WebSocket) forwarding through a tunnel.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use reqwest::header::HOST;
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

mod common;

use common::{domain_tunnels, http_client, raw_request, start_broker, TestBroker, BASE_DOMAIN};

async fn bootstrap(broker: &TestBroker, name: &str) -> u16 {
    let descriptor: Value = http_client()
        .get(broker.url(&format!("/{name}")))
        .header(HOST, BASE_DOMAIN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    descriptor["port"].as_u64().unwrap() as u16
}

fn ws_request(
    broker: &TestBroker,
    host: &str,
) -> tokio_tungstenite::tungstenite::handshake::client::Request {
    let mut request = format!("ws://{}/socket", broker.addr)
        .into_client_request()
        .unwrap();
    request
        .headers_mut()
        .insert("host", host.parse().unwrap());
    request
}

/// Send a WebSocket handshake over raw TCP and collect whatever comes back.
async fn raw_upgrade(broker: &TestBroker, host: &str) -> String {
    let handshake = format!(
        "GET /socket HTTP/1.1\r\n\
         host: {host}\r\n\
         connection: Upgrade\r\n\
         upgrade: websocket\r\n\
         sec-websocket-version: 13\r\n\
         sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n"
    );
    raw_request(broker.addr, &handshake).await
}

#[tokio::test]
async fn websocket_reaches_tenant() {
    let broker = start_broker(domain_tunnels()).await;
    let port = bootstrap(&broker, "chat-app").await;

    common::spawn_ws_tunnel_client(port);
    broker.wait_for_sockets("chat-app", 1).await;

    let (mut ws, response) = connect_async(ws_request(&broker, "chat-app.example.com"))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    ws.send(Message::text("ping")).await.unwrap();
    let echoed = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(echoed.to_text().unwrap(), "ping");

    ws.close(None).await.unwrap();
    broker.stop().await;
}

#[tokio::test]
async fn upgrade_to_unknown_tenant_is_dropped() {
    let broker = start_broker(domain_tunnels()).await;

    let response = raw_upgrade(&broker, "ghost-app.example.com").await;
    assert_eq!(response, "", "expected no response bytes");

    broker.stop().await;
}

#[tokio::test]
async fn upgrade_to_control_plane_is_dropped() {
    let broker = start_broker(domain_tunnels()).await;

    let response = raw_upgrade(&broker, BASE_DOMAIN).await;
    assert_eq!(response, "", "expected no response bytes");

    broker.stop().await;
}

#[tokio::test]
async fn upgrade_without_sockets_is_dropped() {
    let mut config = common::test_config(domain_tunnels());
    config.registry.socket_wait_timeout_ms = 100;
    let broker = common::start_broker_with(config, &[]).await;
    bootstrap(&broker, "idle-app").await;

    let response = raw_upgrade(&broker, "idle-app.example.com").await;
    assert_eq!(response, "", "expected no response bytes");

    broker.stop().await;
}
