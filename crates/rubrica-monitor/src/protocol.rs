//! Event-subscription wire format
//!
//! Outbound requests are `{"type": "request", "message": {"action": ...,
//! "transactionid": ...}}`. Inbound frames carry `message`, either one object
//! or an array of them; notifications look like
//!
//! ```json
//! {"action": "notify", "eventname": "ActiveCallStatus",
//!  "eventbody": [{"uniqueid": "abc", "state": "RINGING",
//!                 "callerid1": "1001", "callerid2": "0512345678"}]}
//! ```

use crate::error::MonitorError;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use uuid::Uuid;

pub const EVENT_EXTENSION_STATUS: &str = "ExtensionStatus";
pub const EVENT_ACTIVE_CALL_STATUS: &str = "ActiveCallStatus";

/// 16 hex characters, unique per request
pub fn transaction_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}

/// Wrap a request body into a frame, stamping a fresh transaction id
pub fn request_frame(mut body: Value) -> Value {
    if let Some(map) = body.as_object_mut() {
        map.insert("transactionid".to_string(), Value::String(transaction_id()));
    }
    json!({ "type": "request", "message": body })
}

pub fn challenge_request(user: &str) -> Value {
    json!({ "action": "challenge", "username": user, "version": "1" })
}

pub fn login_request(user: &str, token: &str) -> Value {
    json!({ "action": "login", "token": token, "username": user })
}

pub fn subscribe_request() -> Value {
    json!({
        "action": "subscribe",
        "eventnames": [EVENT_EXTENSION_STATUS, EVENT_ACTIVE_CALL_STATUS],
    })
}

pub fn heartbeat_request() -> Value {
    json!({ "action": "heartbeat" })
}

/// A decoded inbound frame
#[derive(Debug, Clone)]
pub struct Frame {
    raw: Value,
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, MonitorError> {
        let raw: Value = serde_json::from_str(text)?;
        if !raw.is_object() {
            return Err(MonitorError::Protocol("frame is not a JSON object".to_string()));
        }
        Ok(Self { raw })
    }

    pub fn as_value(&self) -> &Value {
        &self.raw
    }

    /// Objects in `message`, whether it was sent as one object or an array
    fn messages(&self) -> Vec<&Value> {
        match self.raw.get("message") {
            Some(Value::Array(items)) => items.iter().filter(|m| m.is_object()).collect(),
            Some(message @ Value::Object(_)) => vec![message],
            _ => Vec::new(),
        }
    }

    /// Challenge nonce from a challenge reply
    pub fn challenge(&self) -> Option<&str> {
        ["message", "response"]
            .iter()
            .filter_map(|key| self.raw.get(*key))
            .filter_map(|body| body.get("challenge"))
            .filter_map(Value::as_str)
            .find(|challenge| !challenge.is_empty())
    }

    /// Reply status: `message.status` when `message` is an object, otherwise
    /// the top-level `status`
    pub fn status(&self) -> Option<i64> {
        let status = match self.raw.get("message") {
            Some(message @ Value::Object(_)) => message.get("status"),
            _ => self.raw.get("status"),
        }?;

        match status {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.messages()
            .iter()
            .any(|m| m.get("action").and_then(Value::as_str) == Some("notify"))
    }

    /// Every call or extension update carried by this frame
    pub fn notifications(&self) -> Vec<Notification> {
        let mut out = Vec::new();

        for message in self.messages() {
            let action = message.get("action").and_then(Value::as_str).unwrap_or("");
            if action != "notify" {
                if !action.is_empty() {
                    debug!(action = %action, "Ignoring non-notify message");
                }
                continue;
            }

            let eventname = message.get("eventname").and_then(Value::as_str).unwrap_or("");
            let entries: Vec<&Value> = match message.get("eventbody") {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(entry @ Value::Object(_)) => vec![entry],
                _ => Vec::new(),
            };

            match eventname {
                EVENT_ACTIVE_CALL_STATUS => {
                    let mut calls: Vec<Notification> =
                        entries.into_iter().filter_map(decode_call_status).collect();
                    calls.sort_by_key(Notification::trunk_order);
                    out.extend(calls);
                }
                EVENT_EXTENSION_STATUS => {
                    out.extend(entries.into_iter().filter_map(decode_extension_status))
                }
                other => debug!(eventname = %other, "Unhandled notify event"),
            }
        }

        out
    }
}

/// Call phase as reported by the PBX
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Ringing,
    Connected,
    Hangup,
}

impl CallPhase {
    /// Map a vendor state string; an entry `action` of `delete` always means
    /// the channel is gone
    pub fn from_wire(state: &str, action: &str) -> Option<Self> {
        if action.eq_ignore_ascii_case("delete") {
            return Some(CallPhase::Hangup);
        }

        match state {
            "RINGING" | "Ring" | "Ringing" => Some(CallPhase::Ringing),
            "ANSWERED" | "CONNECTED" | "Up" => Some(CallPhase::Connected),
            "HANGUP" | "Down" => Some(CallPhase::Hangup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatusUpdate {
    pub unique_id: String,
    pub phase: CallPhase,
    pub callerid1: String,
    pub callerid2: String,
}

/// Which side of the vendor's channel model an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// A single channel: ringing legs and their teardown
    Unbridge,
    /// Two channels joined after an answer
    Bridge,
}

/// One `chantype`-tagged ActiveCallStatus entry
///
/// Deletes usually carry nothing but channel names, and bridges often come
/// with an empty `linkedid`; both are resolved against the channels seen
/// earlier for the same call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub kind: ChannelKind,
    pub deleted: bool,
    pub uniqueid: String,
    /// `None` when the field was absent, as opposed to sent empty
    pub linkedid: Option<String>,
    pub state: String,
    /// `channel`, `channel1`, `channel2`, in that order, empty ones left out
    pub channels: Vec<String>,
    pub callernum: String,
    pub connectednum: String,
    pub connectedname: String,
    pub callerid1: String,
    pub callerid2: String,
    pub name1: String,
    pub name2: String,
    pub inbound_trunk: Option<String>,
    pub outbound_trunk: Option<String>,
}

impl ChannelEvent {
    pub fn is_ringing(&self) -> bool {
        matches!(self.state.as_str(), "Ring" | "Ringing")
    }

    /// Call id an unbridge entry announces for itself: `linkedid` when
    /// present (possibly empty), else `uniqueid`, else the channel name
    pub fn announced_call_id(&self) -> String {
        match &self.linkedid {
            Some(linkedid) => linkedid.clone(),
            None if !self.uniqueid.is_empty() => self.uniqueid.clone(),
            None => self.channels.first().cloned().unwrap_or_default(),
        }
    }

    pub fn is_inbound_trunk_leg(&self) -> bool {
        self.inbound_trunk.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    CallStatus(CallStatusUpdate),
    Channel(ChannelEvent),
    ExtensionStatus { extension: String, status: String },
}

impl Notification {
    /// Inbound trunk legs sort first so their call is known to be external
    /// before its extension legs are handled
    fn trunk_order(&self) -> u8 {
        match self {
            Notification::Channel(event) if event.is_inbound_trunk_leg() => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CallStatusEntry {
    chantype: String,
    uniqueid: String,
    linkedid: Option<String>,
    state: String,
    action: String,
    channel: String,
    channel1: String,
    channel2: String,
    callerid1: Option<String>,
    callerid2: Option<String>,
    callernum: Option<String>,
    connectednum: Option<String>,
    connectedname: Option<String>,
    name1: Option<String>,
    name2: Option<String>,
    inbound_trunk_name: Option<String>,
    outbound_trunk_name: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn decode_call_status(entry: &Value) -> Option<Notification> {
    let entry: CallStatusEntry = match CallStatusEntry::deserialize(entry) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Malformed ActiveCallStatus entry: {}", e);
            return None;
        }
    };

    match entry.chantype.as_str() {
        "" => decode_plain_status(entry),
        "unbridge" => Some(decode_channel(ChannelKind::Unbridge, entry)),
        "bridge" => Some(decode_channel(ChannelKind::Bridge, entry)),
        other => {
            debug!(chantype = %other, "Unknown ActiveCallStatus chantype, skipped");
            None
        }
    }
}

fn decode_channel(kind: ChannelKind, entry: CallStatusEntry) -> Notification {
    let channels = [entry.channel, entry.channel1, entry.channel2]
        .into_iter()
        .filter(|c| !c.is_empty())
        .collect();

    Notification::Channel(ChannelEvent {
        kind,
        deleted: entry.action.eq_ignore_ascii_case("delete"),
        uniqueid: entry.uniqueid,
        linkedid: entry.linkedid,
        state: entry.state,
        channels,
        callernum: entry.callernum.unwrap_or_default(),
        connectednum: entry.connectednum.unwrap_or_default(),
        connectedname: entry.connectedname.unwrap_or_default(),
        callerid1: entry.callerid1.unwrap_or_default(),
        callerid2: entry.callerid2.unwrap_or_default(),
        name1: entry.name1.unwrap_or_default(),
        name2: entry.name2.unwrap_or_default(),
        inbound_trunk: non_empty(entry.inbound_trunk_name),
        outbound_trunk: non_empty(entry.outbound_trunk_name),
    })
}

/// Entries without `chantype`: one self-describing record per call
fn decode_plain_status(entry: CallStatusEntry) -> Option<Notification> {
    // linkedid groups every channel of one call (ring groups included)
    let unique_id = non_empty(entry.linkedid).unwrap_or(entry.uniqueid);
    if unique_id.is_empty() {
        debug!("ActiveCallStatus entry without call id, skipped");
        return None;
    }

    let Some(phase) = CallPhase::from_wire(&entry.state, &entry.action) else {
        debug!(uniqueid = %unique_id, state = %entry.state, "Unknown call state, skipped");
        return None;
    };

    Some(Notification::CallStatus(CallStatusUpdate {
        unique_id,
        phase,
        callerid1: entry.callerid1.or(entry.callernum).unwrap_or_default(),
        callerid2: entry.callerid2.or(entry.connectednum).unwrap_or_default(),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtensionStatusEntry {
    extension: String,
    status: String,
}

fn decode_extension_status(entry: &Value) -> Option<Notification> {
    let entry = match ExtensionStatusEntry::deserialize(entry) {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Malformed ExtensionStatus entry: {}", e);
            return None;
        }
    };

    if entry.extension.is_empty() {
        return None;
    }

    Some(Notification::ExtensionStatus {
        extension: entry.extension,
        status: entry.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_frame(body: Value) -> Frame {
        Frame::parse(
            &json!({
                "type": "notify",
                "message": {
                    "action": "notify",
                    "eventname": "ActiveCallStatus",
                    "eventbody": body,
                }
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_request_frame_stamps_transaction_id() {
        let frame = request_frame(challenge_request("adminpbx"));

        assert_eq!(frame["type"], "request");
        assert_eq!(frame["message"]["action"], "challenge");
        assert_eq!(frame["message"]["username"], "adminpbx");
        assert_eq!(frame["message"]["version"], "1");

        let tid = frame["message"]["transactionid"].as_str().unwrap();
        assert_eq!(tid.len(), 16);
        assert!(tid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_subscribe_names_both_event_classes() {
        let request = subscribe_request();
        assert_eq!(
            request["eventnames"],
            json!(["ExtensionStatus", "ActiveCallStatus"])
        );
    }

    #[test]
    fn test_challenge_in_message_or_response() {
        let frame = Frame::parse(r#"{"message": {"status": 0, "challenge": "0000001652831137"}}"#).unwrap();
        assert_eq!(frame.challenge(), Some("0000001652831137"));

        let frame = Frame::parse(r#"{"response": {"challenge": "42"}}"#).unwrap();
        assert_eq!(frame.challenge(), Some("42"));

        let frame = Frame::parse(r#"{"message": {"status": 0, "challenge": ""}}"#).unwrap();
        assert_eq!(frame.challenge(), None);
    }

    #[test]
    fn test_status_lookup() {
        assert_eq!(Frame::parse(r#"{"message": {"status": 0}}"#).unwrap().status(), Some(0));
        assert_eq!(Frame::parse(r#"{"message": [], "status": -37}"#).unwrap().status(), Some(-37));
        assert_eq!(Frame::parse(r#"{"message": {"status": "0"}}"#).unwrap().status(), Some(0));
        assert_eq!(Frame::parse(r#"{"message": {}}"#).unwrap().status(), None);
    }

    #[test]
    fn test_non_object_frame_is_rejected() {
        assert!(Frame::parse("[1, 2]").is_err());
        assert!(Frame::parse("not json").is_err());
    }

    #[test]
    fn test_decode_ringing() {
        let frame = call_frame(json!([{
            "uniqueid": "abc",
            "state": "RINGING",
            "callerid1": "1001",
            "callerid2": "0512345678",
        }]));

        assert!(frame.is_notification());
        assert_eq!(
            frame.notifications(),
            vec![Notification::CallStatus(CallStatusUpdate {
                unique_id: "abc".to_string(),
                phase: CallPhase::Ringing,
                callerid1: "1001".to_string(),
                callerid2: "0512345678".to_string(),
            })]
        );
    }

    #[test]
    fn test_linkedid_and_vendor_number_fields() {
        let frame = call_frame(json!({
            "uniqueid": "1700000000.12",
            "linkedid": "1700000000.10",
            "state": "Ring",
            "callernum": "1000",
            "connectednum": "3283259080",
        }));

        let notifications = frame.notifications();
        let Notification::CallStatus(update) = &notifications[0] else {
            panic!("expected a call status");
        };
        assert_eq!(update.unique_id, "1700000000.10");
        assert_eq!(update.callerid1, "1000");
        assert_eq!(update.callerid2, "3283259080");
    }

    #[test]
    fn test_state_mapping() {
        assert_eq!(CallPhase::from_wire("ANSWERED", ""), Some(CallPhase::Connected));
        assert_eq!(CallPhase::from_wire("Up", "update"), Some(CallPhase::Connected));
        assert_eq!(CallPhase::from_wire("HANGUP", ""), Some(CallPhase::Hangup));
        assert_eq!(CallPhase::from_wire("Up", "delete"), Some(CallPhase::Hangup));
        assert_eq!(CallPhase::from_wire("Dialing", "add"), None);
    }

    #[test]
    fn test_unknown_state_and_missing_id_are_skipped() {
        let frame = call_frame(json!([
            { "uniqueid": "abc", "state": "Busy" },
            { "state": "RINGING" },
            { "uniqueid": "def", "state": "HANGUP" },
        ]));

        let notifications = frame.notifications();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(
            &notifications[0],
            Notification::CallStatus(u) if u.unique_id == "def" && u.phase == CallPhase::Hangup
        ));
    }

    #[test]
    fn test_message_array_with_extension_status() {
        let frame = Frame::parse(
            &json!({
                "type": "notify",
                "message": [
                    { "action": "heartbeat", "status": 0 },
                    {
                        "action": "notify",
                        "eventname": "ExtensionStatus",
                        "eventbody": [
                            { "extension": "1001", "status": "Busy" },
                            { "extension": "", "status": "Idle" },
                        ],
                    },
                ]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(
            frame.notifications(),
            vec![Notification::ExtensionStatus {
                extension: "1001".to_string(),
                status: "Busy".to_string(),
            }]
        );
    }

    #[test]
    fn test_reply_is_not_a_notification() {
        let frame = Frame::parse(r#"{"type": "response", "message": {"action": "heartbeat", "status": 0}}"#).unwrap();
        assert!(!frame.is_notification());
        assert!(frame.notifications().is_empty());
    }

    fn channel(notification: &Notification) -> &ChannelEvent {
        match notification {
            Notification::Channel(event) => event,
            other => panic!("expected a channel entry, got {:?}", other),
        }
    }

    #[test]
    fn test_unbridge_entries_keep_missing_and_empty_linkedid_apart() {
        let frame = call_frame(json!([
            { "chantype": "unbridge", "action": "add", "state": "Ringing",
              "uniqueid": "1700000000.12", "linkedid": "",
              "channel": "PJSIP/1001-00000002", "callernum": "1001", "connectednum": "0512345678" },
            { "chantype": "unbridge", "action": "add", "state": "Ring",
              "uniqueid": "1700000000.13", "channel": "PJSIP/1002-00000003" },
        ]));

        let notifications = frame.notifications();
        assert_eq!(notifications.len(), 2);

        let first = channel(&notifications[0]);
        assert_eq!(first.kind, ChannelKind::Unbridge);
        assert!(!first.deleted);
        assert_eq!(first.linkedid.as_deref(), Some(""));
        assert_eq!(first.announced_call_id(), "");
        assert_eq!(first.channels, vec!["PJSIP/1001-00000002"]);
        assert_eq!(first.callernum, "1001");
        assert_eq!(first.connectednum, "0512345678");
        assert!(first.is_ringing());

        let second = channel(&notifications[1]);
        assert_eq!(second.linkedid, None);
        assert_eq!(second.announced_call_id(), "1700000000.13");
    }

    #[test]
    fn test_inbound_trunk_legs_are_ordered_first() {
        let frame = call_frame(json!([
            { "chantype": "unbridge", "action": "add", "state": "Ringing",
              "linkedid": "L1", "channel": "PJSIP/1001-00000002", "inbound_trunk_name": "" },
            { "chantype": "unbridge", "action": "add", "state": "Ring",
              "linkedid": "L1", "channel": "PJSIP/trunk_1-00000001", "inbound_trunk_name": "trunk_1" },
        ]));

        let notifications = frame.notifications();
        let trunk = channel(&notifications[0]);
        assert!(trunk.is_inbound_trunk_leg());
        assert_eq!(trunk.inbound_trunk.as_deref(), Some("trunk_1"));
        assert!(!channel(&notifications[1]).is_inbound_trunk_leg());
    }

    #[test]
    fn test_bridge_delete_lists_both_channels() {
        let frame = call_frame(json!({
            "chantype": "bridge", "action": "delete",
            "channel1": "PJSIP/trunk_1-00000001", "channel2": "PJSIP/1001-00000002",
        }));

        let notifications = frame.notifications();
        let bridge = channel(&notifications[0]);
        assert_eq!(bridge.kind, ChannelKind::Bridge);
        assert!(bridge.deleted);
        assert_eq!(
            bridge.channels,
            vec!["PJSIP/trunk_1-00000001", "PJSIP/1001-00000002"]
        );
    }

    #[test]
    fn test_unknown_chantype_is_skipped() {
        let frame = call_frame(json!([
            { "chantype": "conference", "action": "add", "linkedid": "L1", "state": "Up" },
            { "uniqueid": "abc", "state": "RINGING" },
        ]));

        let notifications = frame.notifications();
        assert_eq!(notifications.len(), 1);
        assert!(matches!(&notifications[0], Notification::CallStatus(u) if u.unique_id == "abc"));
    }
}
