//! Per-connection session loop for the real-time hub (§4.9).

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::auth::Claims;
use super::{Event, Hub};

/// Close code for an invalid/expired session token, per spec §6.
pub const CLOSE_INVALID_TOKEN: u16 = 4001;

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientMessage {
    Ping,
    SubscribeLocation { location_id: i64 },
    SubscribeTenant { tenant_id: i64 },
    Unsubscribe { location_id: i64 },
}

/// Drive one upgraded WebSocket connection until it closes. `claims` has
/// already been decoded and validated by the caller (§4.9: identity is
/// carried via the bearer token passed at session setup).
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, claims: Claims) {
    let session_id: Uuid = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => {
                    let _ = tx.send(Event::pong());
                }
                Ok(ClientMessage::SubscribeTenant { tenant_id }) => {
                    if claims.may_subscribe_tenant(tenant_id) {
                        hub.subscribe_tenant(session_id, tenant_id, tx.clone()).await;
                        let _ = tx.send(Event {
                            event: "subscribed",
                            data: json!({"scope": "tenant", "tenant_id": tenant_id}),
                        });
                    } else {
                        let _ = tx.send(Event {
                            event: "error",
                            data: json!({"message": "not authorized for this tenant"}),
                        });
                    }
                }
                Ok(ClientMessage::SubscribeLocation { location_id }) => {
                    hub.subscribe_location(session_id, location_id, tx.clone())
                        .await;
                    let _ = tx.send(Event {
                        event: "subscribed",
                        data: json!({"scope": "location", "location_id": location_id}),
                    });
                }
                Ok(ClientMessage::Unsubscribe { location_id }) => {
                    hub.unsubscribe_location(session_id, location_id).await;
                }
                Err(e) => {
                    let _ = tx.send(Event {
                        event: "error",
                        data: json!({"message": format!("malformed message: {e}")}),
                    });
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    hub.remove_session(session_id).await;
    drop(tx);
    writer.abort();
}

/// Close the socket immediately with the invalid-token code, before any
/// session loop starts.
pub async fn reject_invalid_token(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: CLOSE_INVALID_TOKEN,
            reason: "invalid or expired token".into(),
        })))
        .await;
}
