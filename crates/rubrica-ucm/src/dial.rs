//! Click-to-dial command

use crate::error::UcmError;
use crate::session::SessionCache;
use rubrica_core::phone;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result reported back to the user
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DialOutcome {
    pub ok: bool,
    pub message: String,
}

impl DialOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Issues `dialOutbound` through the shared [`SessionCache`]
pub struct DialInvoker {
    session: Arc<SessionCache>,
    country_code: String,
}

impl DialInvoker {
    pub fn new(session: Arc<SessionCache>, country_code: impl Into<String>) -> Self {
        Self {
            session,
            country_code: country_code.into(),
        }
    }

    /// Ring `extension` and connect it to `number` once answered
    ///
    /// An API rejection of a cached session (e.g. the PBX restarted and
    /// forgot it) invalidates the token and retries once with a fresh one.
    #[instrument(skip(self))]
    pub async fn dial(&self, extension: &str, number: &str) -> Result<DialOutcome, UcmError> {
        let extension = extension.trim();
        if extension.is_empty() {
            return Err(UcmError::InvalidRequest("extension is required".to_string()));
        }

        let target = phone::to_national(number, &self.country_code);
        if target.is_empty() || target == "+" {
            return Err(UcmError::InvalidRequest("number is required".to_string()));
        }

        // login failures surface as they are; only the dial itself is retried
        let token = self.session.get_token().await?;
        match self.dial_with(token.value(), extension, &target).await {
            Ok(()) => {}
            Err(UcmError::Api { status, message }) => {
                warn!(
                    status = status,
                    "dialOutbound rejected ({}), retrying with a new session", message
                );
                self.session.invalidate();
                let token = self.session.get_token().await?;
                self.dial_with(token.value(), extension, &target).await?;
            }
            Err(e) => return Err(e),
        }

        info!(extension = %extension, target = %target, "Outbound call requested");
        Ok(DialOutcome::success(format!("Calling {}...", target)))
    }

    async fn dial_with(&self, cookie: &str, extension: &str, target: &str) -> Result<(), UcmError> {
        self.session.api().dial_outbound(cookie, extension, target).await
    }
}
