use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors ending one PBX websocket session
///
/// None of these escape the reconnect loop; they are logged and drive the
/// client into `ReconnectWait`.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("Timeout waiting for {0}")]
    Timeout(&'static str),

    #[error("Connection closed by the PBX")]
    Closed,

    #[error("Invalid frame from the PBX: {0}")]
    Protocol(String),

    #[error("The PBX did not return a challenge")]
    MissingChallenge,

    #[error("Login rejected (status={})", fmt_status(.status))]
    LoginRejected { status: Option<i64> },

    #[error("Subscription rejected (status={})", fmt_status(.status))]
    SubscribeRejected { status: Option<i64> },
}

fn fmt_status(status: &Option<i64>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Protocol(err.to_string())
    }
}
