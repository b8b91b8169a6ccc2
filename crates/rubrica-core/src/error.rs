//! Unified error handling for the HTTP boundary
//!
//! Failures coming out of the PBX clients are converted into this type before
//! they reach a handler, so every error response has the same
//! `{"error", "message", "status"}` shape.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    // ==================== PBX Errors ====================
    #[error("PBX session error: {0}")]
    PbxSession(String),

    #[error("PBX command failed: {0}")]
    PbxCommand(String),

    #[error("PBX unreachable: {0}")]
    PbxUnavailable(String),

    // ==================== Directory Errors ====================
    #[error("Directory lookup failed: {0}")]
    Lookup(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) => StatusCode::BAD_REQUEST,

            // 502 Bad Gateway: the PBX refused or could not be reached
            AppError::PbxSession(_) | AppError::PbxCommand(_) | AppError::PbxUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::PbxSession(_) => "pbx_session_error",
            AppError::PbxCommand(_) => "pbx_command_error",
            AppError::PbxUnavailable(_) => "pbx_unavailable",
            AppError::Lookup(_) => "lookup_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
