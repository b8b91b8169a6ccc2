//! Server-Sent Events stream of live PBX events
//!
//! Each event is written as
//!
//! ```text
//! event: call_ring
//! data: {"uniqueid": "...", "state": "ringing", ...}
//! ```
//!
//! with a `:keepalive` comment whenever the stream has been idle for the
//! keepalive interval. The stream ends when the client goes away (the
//! subscription is dropped with the response body) or when the broadcaster
//! drops this subscriber for falling behind.

use actix_web::{http::header, web, HttpResponse};
use bytes::Bytes;
use futures::stream::{self, Stream};
use rubrica_core::DomainEvent;
use rubrica_monitor::{EventBroadcaster, Subscription};
use serde_json::Value;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

const KEEPALIVE: &[u8] = b":keepalive\n\n";

/// Stream tuning shared by the SSE and websocket endpoints
#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub keepalive: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
        }
    }
}

/// GET /api/events
pub async fn event_stream(
    broadcaster: web::Data<EventBroadcaster>,
    settings: web::Data<StreamSettings>,
) -> HttpResponse {
    let subscription = broadcaster.subscribe();
    info!(subscriber_id = subscription.id(), "SSE client connected");

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(sse_stream(subscription, settings.keepalive))
}

/// Turn a subscription into SSE frames, interleaving keepalive comments
pub fn sse_stream(
    subscription: Subscription,
    keepalive: Duration,
) -> impl Stream<Item = Result<Bytes, actix_web::Error>> {
    let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold((subscription, ticker), |(mut subscription, mut ticker)| async move {
        let chunk = tokio::select! {
            event = subscription.recv() => {
                let event = event?;
                ticker.reset();
                sse_frame(&event)
            }
            _ = ticker.tick() => Bytes::from_static(KEEPALIVE),
        };

        Some((Ok(chunk), (subscription, ticker)))
    })
}

/// `event: <name>` plus the event payload without its tag
pub fn sse_frame(event: &DomainEvent) -> Bytes {
    let mut payload = match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            warn!(event = event.name(), "Failed to serialize event: {}", e);
            return Bytes::from_static(KEEPALIVE);
        }
    };
    if let Value::Object(map) = &mut payload {
        map.remove("event");
    }

    Bytes::from(format!("event: {}\ndata: {}\n\n", event.name(), payload))
}
