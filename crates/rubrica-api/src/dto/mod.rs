//! Request and response bodies

use rubrica_core::CallRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// `GET /api/calls`
#[derive(Debug, Clone, Serialize)]
pub struct CallsResponse {
    pub calls: Vec<CallRecord>,
}

/// `GET /api/extensions`
#[derive(Debug, Clone, Serialize)]
pub struct ExtensionsResponse {
    pub extensions: BTreeMap<String, String>,
}

/// `POST /api/call`
///
/// Missing fields deserialize as empty strings so they are reported by
/// validation with the same body as any other invalid request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DialRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 32, message = "extension is required"))]
    pub extension: String,

    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "number is required"))]
    pub number: String,
}

impl DialRequest {
    pub fn trimmed(&self) -> Self {
        Self {
            extension: self.extension.trim().to_string(),
            number: self.number.trim().to_string(),
        }
    }
}

/// `GET /api/lookup/{number}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupResponse {
    pub name: Option<String>,
}

/// `GET /api/v1/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub pbx: String,
    pub active_calls: usize,
    pub subscribers: usize,
}
