//! Fake PBX for integration testing
//!
//! Speaks the event-subscription protocol over plain `ws://` so the client
//! can be driven end to end without a real exchange.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use rubrica_core::{ChallengeAuthenticator, Credential, DirectoryLookup, StaticDirectory};
use rubrica_monitor::{
    CallStateStore, ClientSettings, ConnectionState, EventBroadcaster, ExtensionStatusTable,
    PbxEventClient, Reconciler, TlsTrust,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

pub const CHALLENGE: &str = "0000001652831137";
pub const WAIT: Duration = Duration::from_secs(5);

pub fn credential() -> Credential {
    Credential::new("adminpbx", "pbxsecret")
}

pub struct FakePbx {
    listener: TcpListener,
}

impl FakePbx {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn url(&self) -> String {
        format!("ws://{}/websockify", self.listener.local_addr().unwrap())
    }

    /// Accept the next client connection and complete the websocket upgrade
    pub async fn accept(&self) -> PbxSession {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("client did not connect in time")
            .unwrap();
        let ws = accept_async(stream).await.unwrap();
        PbxSession { ws }
    }
}

pub struct PbxSession {
    ws: WebSocketStream<TcpStream>,
}

impl PbxSession {
    /// Next request `message` sent by the client
    pub async fn recv_request(&mut self) -> Value {
        loop {
            let message = timeout(WAIT, self.ws.next())
                .await
                .expect("no request from client")
                .expect("client closed the connection")
                .unwrap();

            if let Message::Text(text) = message {
                let frame: Value = serde_json::from_str(&text).unwrap();
                assert_eq!(frame["type"], "request");
                return frame["message"].clone();
            }
        }
    }

    pub async fn expect_action(&mut self, action: &str) -> Value {
        let request = self.recv_request().await;
        assert_eq!(request["action"], action, "unexpected request {}", request);
        assert!(request["transactionid"].is_string());
        request
    }

    pub async fn reply(&mut self, action: &str, status: i64, extra: Value) {
        let mut message = json!({ "action": action, "status": status });
        if let (Some(message), Some(extra)) = (message.as_object_mut(), extra.as_object()) {
            message.extend(extra.clone());
        }
        self.send_json(json!({ "type": "response", "message": message }))
            .await;
    }

    pub async fn send_json(&mut self, frame: Value) {
        self.send_text(frame.to_string()).await;
    }

    pub async fn send_text(&mut self, text: impl Into<String>) {
        self.ws.send(Message::Text(text.into())).await.unwrap();
    }

    /// Challenge, login and subscribe, all accepted
    pub async fn handshake(&mut self) {
        let token = self.challenge_and_login().await;
        assert_eq!(
            token,
            ChallengeAuthenticator::default().respond(&credential(), CHALLENGE)
        );
        self.reply("login", 0, json!({})).await;

        let request = self.expect_action("subscribe").await;
        assert_eq!(
            request["eventnames"],
            json!(["ExtensionStatus", "ActiveCallStatus"])
        );
        self.reply("subscribe", 0, json!({})).await;
    }

    /// Answer the challenge and return the login token, leaving the login
    /// unanswered
    pub async fn challenge_and_login(&mut self) -> String {
        let request = self.expect_action("challenge").await;
        assert_eq!(request["username"], "adminpbx");
        self.reply("challenge", 0, json!({ "challenge": CHALLENGE }))
            .await;

        let request = self.expect_action("login").await;
        assert_eq!(request["username"], "adminpbx");
        request["token"].as_str().unwrap().to_string()
    }

    pub async fn notify(&mut self, eventname: &str, eventbody: Value) {
        self.send_json(json!({
            "type": "notify",
            "message": {
                "action": "notify",
                "eventname": eventname,
                "eventbody": eventbody,
            }
        }))
        .await;
    }

    pub async fn call_status(&mut self, uniqueid: &str, state: &str) {
        self.notify(
            "ActiveCallStatus",
            json!([{
                "uniqueid": uniqueid,
                "state": state,
                "callerid1": "1001",
                "callerid2": "0512345678",
            }]),
        )
        .await;
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Client wired to in-memory tables, as `main` wires it
pub struct Harness {
    pub store: Arc<CallStateStore>,
    pub extensions: Arc<ExtensionStatusTable>,
    pub broadcaster: EventBroadcaster,
    pub state: watch::Receiver<ConnectionState>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl Harness {
    pub fn start(url: &str, heartbeat: Duration, reconnect_delay: Duration) -> Self {
        let store = Arc::new(CallStateStore::new());
        let extensions = Arc::new(ExtensionStatusTable::new());
        let broadcaster = EventBroadcaster::new(16);
        let directory: Arc<dyn DirectoryLookup> = Arc::new(StaticDirectory::from_entries(
            "39",
            [("0512345678", "Mario Rossi")],
        ));

        let reconciler = Reconciler::new(
            store.clone(),
            extensions.clone(),
            broadcaster.clone(),
            directory,
            Duration::from_millis(500),
        );
        let settings = ClientSettings {
            url: url.to_string(),
            credential: credential(),
            authenticator: ChallengeAuthenticator::default(),
            trust: TlsTrust::AcceptInvalidCerts,
            heartbeat_interval: heartbeat,
            reconnect_delay,
            response_timeout: Duration::from_secs(2),
        };

        let client = PbxEventClient::new(settings, reconciler);
        let state = client.watch_state();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(client.run(shutdown.clone()));

        Self {
            store,
            extensions,
            broadcaster,
            state,
            shutdown,
            handle,
        }
    }

    pub async fn wait_for_state(&mut self, wanted: ConnectionState) {
        timeout(WAIT, self.state.wait_for(|state| *state == wanted))
            .await
            .unwrap_or_else(|_| panic!("client never reached {}", wanted))
            .unwrap();
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        timeout(WAIT, self.handle)
            .await
            .expect("client did not stop")
            .unwrap();
    }
}
