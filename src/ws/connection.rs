//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! applying subscription commands and forwarding filtered events.

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType, WsRequest};
use super::subscription::SubscriptionManager;
use crate::domain::{MonitorEvent, MonitorId};

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads subscription commands from the client and answers them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<MonitorEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut subs = SubscriptionManager::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let response = handle_text_message(text.as_str(), &mut subs);
                        if let Some(json) = response
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !subs.forward(&event) {
                            continue;
                        }
                        if let Some(json) = event_envelope(&event)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn event_envelope(event: &MonitorEvent) -> Option<String> {
    let payload = serde_json::to_value(event).ok()?;
    let msg = WsMessage::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload);
    serde_json::to_string(&msg).ok()
}

/// Splits raw IDs into parsed monitor IDs and the wildcard flag. Entries
/// that are not UUIDs are ignored.
fn parse_ids(raw: &[String]) -> (Vec<MonitorId>, bool) {
    let wildcard = raw.iter().any(|s| s == "*");
    let ids = raw
        .iter()
        .filter_map(|s| s.parse::<uuid::Uuid>().ok())
        .map(MonitorId::from_uuid)
        .collect();
    (ids, wildcard)
}

/// Handles a text message from the client, returning the JSON reply.
fn handle_text_message(text: &str, subs: &mut SubscriptionManager) -> Option<String> {
    let request = match serde_json::from_str::<WsRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            let err = WsMessage::error(String::new(), 400, &format!("invalid command: {e}"));
            return serde_json::to_string(&err).ok();
        }
    };
    let id = request.id.unwrap_or_default();

    let payload = match request.command {
        WsCommand::Subscribe { monitor_ids } => {
            let (ids, wildcard) = parse_ids(&monitor_ids);
            let added = subs.subscribe(&ids, wildcard);
            serde_json::json!({
                "subscribed": added.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
        WsCommand::Unsubscribe { monitor_ids } => {
            let (ids, wildcard) = parse_ids(&monitor_ids);
            subs.unsubscribe(&ids, wildcard);
            serde_json::json!({
                "unsubscribed": ids.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "remaining_count": subs.count(),
                "wildcard": subs.is_subscribed_all(),
            })
        }
    };
    serde_json::to_string(&WsMessage::new(id, WsMessageType::Response, payload)).ok()
}
