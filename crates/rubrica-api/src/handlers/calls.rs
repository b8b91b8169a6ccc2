//! Active call and extension status queries

use crate::dto::{CallsResponse, ExtensionsResponse};
use actix_web::{web, HttpResponse};
use rubrica_monitor::{CallStateStore, ExtensionStatusTable};
use tracing::{debug, instrument};

/// List active calls, oldest first
///
/// GET /api/calls
#[instrument(skip(store))]
pub async fn list_calls(store: web::Data<CallStateStore>) -> HttpResponse {
    let calls = store.snapshot();
    debug!(count = calls.len(), "Listing active calls");

    HttpResponse::Ok().json(CallsResponse { calls })
}

/// Last known status of every extension
///
/// GET /api/extensions
#[instrument(skip(extensions))]
pub async fn list_extensions(extensions: web::Data<ExtensionStatusTable>) -> HttpResponse {
    HttpResponse::Ok().json(ExtensionsResponse {
        extensions: extensions.snapshot(),
    })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/calls", web::get().to(list_calls))
        .route("/extensions", web::get().to(list_extensions));
}
