use super::call::CallRecord;
use serde::Serialize;

/// Event published to live subscribers
///
/// Serialized with an `event` tag carrying the wire name (`call_ring`,
/// `call_connect`, `call_hangup`, `extension_status`) next to the payload
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    CallRing(CallRecord),
    CallConnect(CallRecord),
    CallHangup(CallRecord),
    ExtensionStatus { extension: String, status: String },
}

impl DomainEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::CallRing(_) => "call_ring",
            DomainEvent::CallConnect(_) => "call_connect",
            DomainEvent::CallHangup(_) => "call_hangup",
            DomainEvent::ExtensionStatus { .. } => "extension_status",
        }
    }

    /// Call snapshot carried by the call variants
    pub fn call(&self) -> Option<&CallRecord> {
        match self {
            DomainEvent::CallRing(call)
            | DomainEvent::CallConnect(call)
            | DomainEvent::CallHangup(call) => Some(call),
            DomainEvent::ExtensionStatus { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CallState;

    #[test]
    fn test_call_event_is_tagged() {
        let record = CallRecord::new("abc", CallState::Connected, "1001", "0512345678");
        let event = DomainEvent::CallConnect(record);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "call_connect");
        assert_eq!(json["uniqueid"], "abc");
        assert_eq!(json["state"], "connected");
        assert_eq!(event.name(), "call_connect");
        assert_eq!(event.call().map(|c| c.unique_id.as_str()), Some("abc"));
    }

    #[test]
    fn test_extension_status_shape() {
        let event = DomainEvent::ExtensionStatus {
            extension: "1001".to_string(),
            status: "Busy".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "extension_status");
        assert_eq!(json["extension"], "1001");
        assert_eq!(json["status"], "Busy");
        assert!(event.call().is_none());
    }
}
