//! Click-to-dial

use crate::dto::DialRequest;
use actix_web::{error::InternalError, web, HttpResponse};
use rubrica_core::AppError;
use rubrica_ucm::{DialInvoker, DialOutcome};
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationErrors};

/// Ring `extension` and connect it to `number`
///
/// POST /api/call
///
/// Always answers `{"ok", "message"}`: 200 on success, 400 for an invalid
/// request, 502 when the PBX refused or could not be reached.
#[instrument(skip(dialer, req))]
pub async fn place_call(dialer: web::Data<DialInvoker>, req: web::Json<DialRequest>) -> HttpResponse {
    let request = req.into_inner().trimmed();

    if let Err(e) = request.validate() {
        warn!("Dial request rejected: {}", e);
        return HttpResponse::BadRequest().json(DialOutcome::failure(validation_message(&e)));
    }

    match dialer.dial(&request.extension, &request.number).await {
        Ok(outcome) => {
            info!(extension = %request.extension, "Dial command accepted");
            HttpResponse::Ok().json(outcome)
        }
        Err(e) => {
            let message = e.to_string();
            let status = AppError::from(e).status_code();
            warn!(extension = %request.extension, status = %status, "Dial failed: {}", message);
            HttpResponse::build(status).json(DialOutcome::failure(message))
        }
    }
}

fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .map(|err| {
            err.message
                .as_ref()
                .map_or_else(|| err.code.to_string(), |m| m.to_string())
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/call")
            .app_data(web::JsonConfig::default().limit(4096).error_handler(|err, _req| {
                let response =
                    HttpResponse::BadRequest().json(DialOutcome::failure("invalid request"));
                InternalError::from_response(err, response).into()
            }))
            .route(web::post().to(place_call)),
    );
}
