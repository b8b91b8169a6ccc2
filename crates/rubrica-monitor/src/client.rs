//! Long-running PBX event client
//!
//! One instance runs for the whole process lifetime. Each pass of the loop is
//! one session: connect, authenticate, subscribe, then read notifications and
//! send heartbeats until the connection fails. Failures are never fatal; the
//! client clears its tables, waits the reconnect delay and starts over until
//! shutdown is requested.

use crate::connection::{PbxConnection, TlsTrust};
use crate::error::MonitorError;
use crate::protocol::{self, Frame};
use crate::reconcile::Reconciler;
use rubrica_core::{AppConfig, ChallengeAuthenticator, Credential};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection lifecycle as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Authenticating,
    Subscribing,
    Active,
    ReconnectWait,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Subscribing => "subscribing",
            ConnectionState::Active => "active",
            ConnectionState::ReconnectWait => "reconnect_wait",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the client needs to reach and log into the PBX
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub url: String,
    pub credential: Credential,
    pub authenticator: ChallengeAuthenticator,
    pub trust: TlsTrust,
    pub heartbeat_interval: Duration,
    pub reconnect_delay: Duration,
    pub response_timeout: Duration,
}

impl ClientSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let monitor = &config.monitor;
        Self {
            url: config.monitor_url(),
            credential: monitor.credential(),
            authenticator: monitor.authenticator(),
            trust: TlsTrust::from_verify_flag(monitor.verify_tls),
            heartbeat_interval: monitor.heartbeat_interval(),
            reconnect_delay: monitor.reconnect_delay(),
            response_timeout: monitor.response_timeout(),
        }
    }
}

pub struct PbxEventClient {
    settings: ClientSettings,
    reconciler: Reconciler,
    state_tx: watch::Sender<ConnectionState>,
}

impl PbxEventClient {
    pub fn new(settings: ClientSettings, reconciler: Reconciler) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            settings,
            reconciler,
            state_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Receiver following every state transition
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "PBX connection state");
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(url = %self.settings.url, user = %self.settings.credential.user(), "PBX event client started");

        loop {
            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.session() => outcome,
            };

            match outcome {
                Ok(()) => warn!("PBX connection closed by peer"),
                Err(e) => error!("PBX session failed: {}", e),
            }

            self.reconciler.reset();
            self.set_state(ConnectionState::Disconnected);
            self.set_state(ConnectionState::ReconnectWait);

            info!(
                "Reconnecting to PBX in {} seconds...",
                self.settings.reconnect_delay.as_secs_f32()
            );
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.settings.reconnect_delay) => {}
            }
        }

        self.reconciler.reset();
        self.set_state(ConnectionState::Disconnected);
        info!("PBX event client stopped");
    }

    /// One connection from connect to failure; `Ok` means the peer closed
    async fn session(&self) -> Result<(), MonitorError> {
        self.set_state(ConnectionState::Connecting);
        let mut conn = timeout(
            self.settings.response_timeout,
            PbxConnection::connect(&self.settings.url, self.settings.trust),
        )
        .await
        .map_err(|_| MonitorError::Timeout("connection"))??;

        let result = self.drive(&mut conn).await;
        conn.close().await;
        result
    }

    async fn drive(&self, conn: &mut PbxConnection) -> Result<(), MonitorError> {
        self.set_state(ConnectionState::Authenticating);
        self.authenticate(conn).await?;

        self.set_state(ConnectionState::Subscribing);
        self.subscribe(conn).await?;

        self.set_state(ConnectionState::Active);
        info!("PBX event stream active");

        let period = self.settings.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    conn.send_request(protocol::heartbeat_request()).await?;
                    debug!("Heartbeat sent");
                }
                text = conn.next_text() => match text? {
                    Some(text) => self.handle_frame(&text).await,
                    None => return Ok(()),
                },
            }
        }
    }

    async fn authenticate(&self, conn: &mut PbxConnection) -> Result<(), MonitorError> {
        let credential = &self.settings.credential;
        let wait = self.settings.response_timeout;

        conn.send_request(protocol::challenge_request(credential.user()))
            .await?;
        let reply = conn.recv_reply(wait, "challenge").await?;
        let challenge = reply.challenge().ok_or(MonitorError::MissingChallenge)?;
        debug!(challenge = %challenge, "Challenge received");

        let token = self.settings.authenticator.respond(credential, challenge);
        conn.send_request(protocol::login_request(credential.user(), &token))
            .await?;
        let reply = conn.recv_reply(wait, "login").await?;

        match reply.status() {
            Some(0) => {
                info!(user = %credential.user(), "PBX login accepted");
                Ok(())
            }
            status => Err(MonitorError::LoginRejected { status }),
        }
    }

    async fn subscribe(&self, conn: &mut PbxConnection) -> Result<(), MonitorError> {
        conn.send_request(protocol::subscribe_request()).await?;
        let reply = conn
            .recv_reply(self.settings.response_timeout, "subscribe")
            .await?;

        match reply.status() {
            Some(0) => {
                info!("Subscribed to ExtensionStatus and ActiveCallStatus");
                Ok(())
            }
            status => Err(MonitorError::SubscribeRejected { status }),
        }
    }

    async fn handle_frame(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                let preview: String = text.chars().take(200).collect();
                warn!("Ignoring malformed PBX frame ({}): {}", e, preview);
                return;
            }
        };

        for notification in frame.notifications() {
            self.reconciler.apply(notification).await;
        }
    }
}
