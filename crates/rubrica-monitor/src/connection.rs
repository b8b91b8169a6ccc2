//! Websocket transport to the PBX
//!
//! Every frame sent or received is logged at `trace` level under the
//! `pbx_raw` target (`RUST_LOG=pbx_raw=trace`).

use crate::error::MonitorError;
use crate::protocol::{self, Frame};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{
    connect_async, connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace, warn};

/// Certificate policy for the PBX websocket
///
/// The stock UCM certificate is self-signed, so the default accepts it. The
/// override only applies to the connector built for this connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsTrust {
    #[default]
    AcceptInvalidCerts,
    Verify,
}

impl TlsTrust {
    pub fn from_verify_flag(verify_tls: bool) -> Self {
        if verify_tls {
            TlsTrust::Verify
        } else {
            TlsTrust::AcceptInvalidCerts
        }
    }

    fn connector(self) -> Result<Connector, MonitorError> {
        let mut builder = native_tls::TlsConnector::builder();
        if self == TlsTrust::AcceptInvalidCerts {
            builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        Ok(Connector::NativeTls(builder.build()?))
    }
}

pub struct PbxConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl PbxConnection {
    /// Open the websocket; `wss://` URLs go through a connector built from
    /// `trust`
    pub async fn connect(url: &str, trust: TlsTrust) -> Result<Self, MonitorError> {
        info!(url = %url, "Connecting to PBX websocket");
        trace!(target: "pbx_raw", "=== new session: {} ===", url);

        let (ws, _response) = if url.starts_with("wss://") {
            connect_async_tls_with_config(url, None, false, Some(trust.connector()?)).await?
        } else {
            connect_async(url).await?
        };

        info!(url = %url, "PBX websocket connected");
        Ok(Self { ws })
    }

    /// Send a request body, stamped with a fresh transaction id
    pub async fn send_request(&mut self, body: Value) -> Result<(), MonitorError> {
        let frame = protocol::request_frame(body);
        let raw = frame.to_string();
        trace!(target: "pbx_raw", ">>> TX >>> {}", raw);
        self.ws.send(Message::Text(raw)).await?;
        Ok(())
    }

    /// Next text frame, or `None` once the peer has closed the connection
    pub async fn next_text(&mut self) -> Result<Option<String>, MonitorError> {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    trace!(target: "pbx_raw", "<<< RX <<< {}", text);
                    return Ok(Some(text));
                }
                Ok(Message::Binary(data)) => {
                    let text = String::from_utf8_lossy(&data).into_owned();
                    trace!(target: "pbx_raw", "<<< RX (binary) <<< {}", text);
                    return Ok(Some(text));
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "PBX sent close frame");
                    return Ok(None);
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }

        Ok(None)
    }

    /// Wait for the reply to a request, skipping notifications that arrive in
    /// between
    pub async fn recv_reply(&mut self, wait: Duration, what: &'static str) -> Result<Frame, MonitorError> {
        timeout(wait, async {
            loop {
                let text = self.next_text().await?.ok_or(MonitorError::Closed)?;
                match Frame::parse(&text) {
                    Ok(frame) if frame.is_notification() => {
                        debug!("Notification received while waiting for {}, skipped", what);
                    }
                    Ok(frame) => return Ok::<_, MonitorError>(frame),
                    Err(e) => warn!("Unparseable frame while waiting for {}: {}", what, e),
                }
            }
        })
        .await
        .map_err(|_| MonitorError::Timeout(what))?
    }

    pub async fn close(mut self) {
        if let Err(e) = self.ws.close(None).await {
            debug!("Error closing PBX websocket: {}", e);
        }
        trace!(target: "pbx_raw", "=== session closed ===");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_from_flag() {
        assert_eq!(TlsTrust::from_verify_flag(false), TlsTrust::AcceptInvalidCerts);
        assert_eq!(TlsTrust::from_verify_flag(true), TlsTrust::Verify);
        assert_eq!(TlsTrust::default(), TlsTrust::AcceptInvalidCerts);
    }

    #[test]
    fn test_connector_builds_for_both_policies() {
        assert!(TlsTrust::AcceptInvalidCerts.connector().is_ok());
        assert!(TlsTrust::Verify.connector().is_ok());
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = PbxConnection::connect(&format!("ws://{}/websockify", addr), TlsTrust::Verify).await;
        assert!(matches!(result, Err(MonitorError::WebSocket(_))));
    }
}
