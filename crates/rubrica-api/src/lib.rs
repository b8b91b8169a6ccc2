//! HTTP API layer for Rubrica
//!
//! Read-only views of the live PBX tables, the SSE and websocket event
//! feeds, directory lookup and click-to-dial.

#![forbid(unsafe_code)]

pub mod dto;
pub mod handlers;

pub use dto::{CallsResponse, DialRequest, ExtensionsResponse, HealthResponse, LookupResponse};
pub use handlers::{PbxStatus, StreamSettings};

use actix_web::web;
use rubrica_core::DirectoryLookup;
use rubrica_monitor::{CallStateStore, EventBroadcaster, ExtensionStatusTable};
use rubrica_ucm::DialInvoker;
use std::sync::Arc;

/// Shared handles every worker's `App` is built from
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<CallStateStore>,
    pub extensions: Arc<ExtensionStatusTable>,
    pub broadcaster: EventBroadcaster,
    pub directory: Arc<dyn DirectoryLookup>,
    pub dialer: Arc<DialInvoker>,
    pub pbx_status: PbxStatus,
    pub stream: StreamSettings,
}

impl ApiState {
    /// Register app data and routes; use with `App::configure`
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::from(self.store.clone()))
            .app_data(web::Data::from(self.extensions.clone()))
            .app_data(web::Data::new(self.broadcaster.clone()))
            .app_data(web::Data::from(self.directory.clone()))
            .app_data(web::Data::from(self.dialer.clone()))
            .app_data(web::Data::new(self.pbx_status.clone()))
            .app_data(web::Data::new(self.stream));

        configure_routes(cfg);
    }
}

/// Route table
///
/// ```text
/// GET  /api/v1/health
/// GET  /api/calls
/// GET  /api/extensions
/// GET  /api/lookup/{number}
/// POST /api/call
/// GET  /api/events        (text/event-stream)
/// GET  /ws                (websocket)
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    // /api/v1 before /api, scopes match by prefix
    cfg.service(
        web::scope("/api/v1").route("/health", web::get().to(handlers::health_check)),
    )
    .service(
        web::scope("/api")
            .configure(handlers::configure_calls)
            .configure(handlers::configure_dial)
            .configure(handlers::configure_lookup)
            .route("/events", web::get().to(handlers::event_stream)),
    )
    .route("/ws", web::get().to(handlers::ws_handler));
}
