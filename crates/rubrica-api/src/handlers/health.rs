//! Service health

use crate::dto::HealthResponse;
use actix_web::{web, HttpResponse};
use rubrica_monitor::{CallStateStore, ConnectionState, EventBroadcaster};
use tokio::sync::watch;

/// Read side of the event client's connection state
#[derive(Clone)]
pub struct PbxStatus {
    rx: watch::Receiver<ConnectionState>,
}

impl PbxStatus {
    pub fn new(rx: watch::Receiver<ConnectionState>) -> Self {
        Self { rx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.rx.borrow()
    }
}

/// GET /api/v1/health
pub async fn health_check(
    status: web::Data<PbxStatus>,
    store: web::Data<CallStateStore>,
    broadcaster: web::Data<EventBroadcaster>,
) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        service: "rubrica",
        version: env!("CARGO_PKG_VERSION"),
        pbx: status.current().to_string(),
        active_calls: store.len(),
        subscribers: broadcaster.subscriber_count(),
    })
}
