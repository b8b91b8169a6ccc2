//! Directory lookup by phone number

use crate::dto::LookupResponse;
use actix_web::{web, HttpResponse};
use rubrica_core::DirectoryLookup;
use tracing::{instrument, warn};

/// Resolve a number to a contact name; errors answer like a miss
///
/// GET /api/lookup/{number}
#[instrument(skip(directory))]
pub async fn lookup_number(
    directory: web::Data<dyn DirectoryLookup>,
    path: web::Path<String>,
) -> HttpResponse {
    let number = path.into_inner();

    let name = match directory.lookup(&number).await {
        Ok(name) => name,
        Err(e) => {
            warn!(number = %number, "Directory lookup failed: {}", e);
            None
        }
    };

    HttpResponse::Ok().json(LookupResponse { name })
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/lookup/{number}", web::get().to(lookup_number));
}
