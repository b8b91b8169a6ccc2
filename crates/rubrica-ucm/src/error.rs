use rubrica_core::AppError;
use thiserror::Error;

/// Errors from the PBX HTTPS API
///
/// `Clone` because a single session refresh hands its outcome to every caller
/// that was waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UcmError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: no response from the PBX within {0}s")]
    Timeout(u64),

    #[error("HTTP error: status {0}")]
    HttpError(u16),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("PBX error {status}: {message}")]
    Api { status: i64, message: String },

    #[error("The PBX did not return a valid challenge")]
    MissingChallenge,

    #[error("Authentication failed: no session cookie received")]
    MissingCookie,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<UcmError> for AppError {
    fn from(err: UcmError) -> Self {
        match err {
            UcmError::InvalidRequest(msg) => AppError::Validation(msg),
            UcmError::Config(msg) => AppError::Config(msg),
            UcmError::Connection(_) | UcmError::Timeout(_) | UcmError::HttpError(_) => {
                AppError::PbxUnavailable(err.to_string())
            }
            UcmError::MissingChallenge | UcmError::MissingCookie => {
                AppError::PbxSession(err.to_string())
            }
            UcmError::ParseError(_) | UcmError::Api { .. } => AppError::PbxCommand(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_app_error() {
        let app: AppError = UcmError::InvalidRequest("extension is required".to_string()).into();
        assert_eq!(app.error_code(), "validation_error");

        let app: AppError = UcmError::Timeout(10).into();
        assert_eq!(app.error_code(), "pbx_unavailable");

        let app: AppError = UcmError::MissingCookie.into();
        assert_eq!(app.error_code(), "pbx_session_error");

        let app: AppError = UcmError::Api {
            status: -37,
            message: "Wrong account or password".to_string(),
        }
        .into();
        assert_eq!(app.error_code(), "pbx_command_error");
        assert!(app.to_string().contains("Wrong account or password"));
    }
}
