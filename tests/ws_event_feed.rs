//! WebSocket feed over a real listener: subscription replies and filtered
//! monitor events.

#![allow(clippy::panic, clippy::expect_used)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

use common::build_test_context;
use cronwatch::domain::NewMonitor;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn serve() -> (SocketAddr, common::TestContext) {
    let ctx = build_test_context();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    let app = ctx.app.clone();
    tokio::spawn(async move {
        let _ = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await;
    });
    (addr, ctx)
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("json frame");
        }
    }
}

async fn new_monitor(ctx: &common::TestContext, slug: &str) -> cronwatch::domain::Monitor {
    ctx.state
        .monitors
        .create(NewMonitor {
            name: slug.to_string(),
            slug: Some(slug.to_string()),
            interval_secs: 600,
            ..NewMonitor::default()
        })
        .await
        .expect("create monitor")
}

#[tokio::test]
async fn subscribed_client_receives_status_change() {
    let (addr, ctx) = serve().await;
    let monitor = new_monitor(&ctx, "ws-watched").await;
    let other = new_monitor(&ctx, "ws-ignored").await;

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");

    let subscribe = format!(
        r#"{{"id":"sub-1","command":"subscribe","monitor_ids":["{}"]}}"#,
        monitor.id
    );
    client
        .send(Message::text(subscribe))
        .await
        .expect("send subscribe");
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "sub-1");
    assert_eq!(reply["payload"]["count"], 1);

    ctx.state.monitors.pause(other.id).await.expect("pause other");
    ctx.state.monitors.pause(monitor.id).await.expect("pause watched");

    let event = next_json(&mut client).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["payload"]["event_type"], "status_changed");
    assert_eq!(event["payload"]["monitor_id"], monitor.id.to_string());
    assert_eq!(event["payload"]["to"], "paused");
}

#[tokio::test]
async fn unknown_command_gets_error_frame() {
    let (addr, _ctx) = serve().await;
    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");

    client
        .send(Message::text(r#"{"command":"get_state"}"#))
        .await
        .expect("send");
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], 400);
}
