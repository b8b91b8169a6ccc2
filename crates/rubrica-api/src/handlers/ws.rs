//! WebSocket feed of live PBX events
//!
//! On connect the client receives a snapshot of the current tables, then
//! every event as it is published, serialized the same way as the event
//! itself (`{"event": "call_ring", ...}`).

use super::events::StreamSettings;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, Session};
use futures::StreamExt;
use rubrica_core::{CallRecord, DomainEvent};
use rubrica_monitor::{CallStateStore, EventBroadcaster, ExtensionStatusTable, Subscription};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Messages generated by the socket itself
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WsMessage {
    /// Tables as they stood when the client connected
    Snapshot {
        calls: Vec<CallRecord>,
        extensions: BTreeMap<String, String>,
    },
    Pong,
}

/// GET /ws
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    broadcaster: web::Data<EventBroadcaster>,
    store: web::Data<CallStateStore>,
    extensions: web::Data<ExtensionStatusTable>,
    settings: web::Data<StreamSettings>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    // subscribe before the snapshot so nothing falls between the two
    let subscription = broadcaster.subscribe();
    let snapshot = WsMessage::Snapshot {
        calls: store.snapshot(),
        extensions: extensions.snapshot(),
    };

    info!(client = %client_ip, subscriber_id = subscription.id(), "WebSocket connection established");

    actix_web::rt::spawn(ws_session(
        session,
        msg_stream,
        subscription,
        snapshot,
        *settings.get_ref(),
        client_ip,
    ));

    Ok(response)
}

async fn ws_session(
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
    mut subscription: Subscription,
    snapshot: WsMessage,
    settings: StreamSettings,
    client_ip: String,
) {
    if send_json(&mut session, &snapshot).await.is_err() {
        warn!(client = %client_ip, "Failed to send snapshot, closing connection");
        return;
    }

    let mut ping_interval = interval_at(Instant::now() + settings.keepalive, settings.keepalive);

    loop {
        tokio::select! {
            msg = msg_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    debug!(client = %client_ip, "Received text: {}", text);
                    if is_ping(&text) && send_json(&mut session, &WsMessage::Pong).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Ping(bytes))) => {
                    if session.pong(&bytes).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(reason))) => {
                    info!(client = %client_ip, "Client closed connection: {:?}", reason);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(client = %client_ip, "WebSocket error: {}", e);
                    break;
                }
                None => break,
            },

            event = subscription.recv() => match event {
                Some(event) => {
                    if send_event(&mut session, &event).await.is_err() {
                        warn!(client = %client_ip, "Failed to send event, closing connection");
                        break;
                    }
                }
                None => {
                    warn!(client = %client_ip, "Subscriber dropped by broadcaster, closing connection");
                    break;
                }
            },

            _ = ping_interval.tick() => {
                if session.ping(b"").await.is_err() {
                    warn!(client = %client_ip, "Failed to send ping, closing connection");
                    break;
                }
            }
        }
    }

    info!(client = %client_ip, "WebSocket connection closed");
    let _ = session.close(None).await;
}

/// Client keepalive: a bare `ping` or `{"event": "ping"}`
fn is_ping(text: &str) -> bool {
    let text = text.trim();
    if text.eq_ignore_ascii_case("ping") {
        return true;
    }

    serde_json::from_str::<serde_json::Value>(text)
        .map(|value| value.get("event").and_then(|e| e.as_str()) == Some("ping"))
        .unwrap_or(false)
}

async fn send_event(session: &mut Session, event: &Arc<DomainEvent>) -> Result<(), actix_ws::Closed> {
    send_json(session, event.as_ref()).await
}

async fn send_json<T: Serialize>(session: &mut Session, message: &T) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(message) {
        Ok(json) => session.text(json).await,
        Err(e) => {
            error!("Failed to serialize websocket message: {}", e);
            Ok(())
        }
    }
}
