use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of a call tracked in the active call table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    Ringing,
    Connected,
}

impl CallState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Ringing => "ringing",
            CallState::Connected => "connected",
        }
    }
}

/// A call currently known to the PBX
///
/// `name1`/`name2` are the directory display names resolved for
/// `callerid1`/`callerid2`; they stay `None` when the lookup misses.
/// `extensions` lists every extension rung for the call, more than one when
/// it reached a ring group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    #[serde(rename = "uniqueid")]
    pub unique_id: String,
    pub state: CallState,
    pub callerid1: String,
    pub callerid2: String,
    pub name1: Option<String>,
    pub name2: Option<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(
        unique_id: impl Into<String>,
        state: CallState,
        callerid1: impl Into<String>,
        callerid2: impl Into<String>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            state,
            callerid1: callerid1.into(),
            callerid2: callerid2.into(),
            name1: None,
            name2: None,
            extensions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn with_names(mut self, name1: Option<String>, name2: Option<String>) -> Self {
        self.name1 = name1;
        self.name2 = name2;
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.add_extension(extension);
        self
    }

    /// Record another rung extension; returns `false` when already listed
    pub fn add_extension(&mut self, extension: impl Into<String>) -> bool {
        let extension = extension.into();
        if extension.is_empty() || self.extensions.contains(&extension) {
            return false;
        }
        self.extensions.push(extension);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_record_json_shape() {
        let record = CallRecord::new("abc", CallState::Ringing, "1001", "0512345678")
            .with_names(None, Some("Mario Rossi".to_string()));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["uniqueid"], "abc");
        assert_eq!(json["state"], "ringing");
        assert_eq!(json["callerid1"], "1001");
        assert_eq!(json["callerid2"], "0512345678");
        assert!(json["name1"].is_null());
        assert_eq!(json["name2"], "Mario Rossi");
        assert!(json["started_at"].is_string());
        assert_eq!(json["extensions"], serde_json::json!([]));
    }

    #[test]
    fn test_ring_group_extensions() {
        let mut record = CallRecord::new("L1", CallState::Ringing, "3283259080", "1001")
            .with_extension("1001");

        assert!(record.add_extension("1002"));
        assert!(!record.add_extension("1001"));
        assert!(!record.add_extension(""));
        assert_eq!(record.extensions, vec!["1001", "1002"]);
    }
}
