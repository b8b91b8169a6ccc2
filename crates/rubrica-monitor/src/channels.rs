//! Channel bookkeeping for vendor ActiveCallStatus entries
//!
//! The PBX reports calls channel by channel. Every channel of one call shares
//! a `linkedid`, but only the entries that create a channel say so: deletes
//! name just the channel and bridges often send an empty `linkedid`. The
//! tracker remembers which call each live channel belongs to, so those
//! entries can be attributed, and tells when the last channel of a call is
//! gone.

use std::collections::{HashMap, HashSet};

/// Outcome of releasing channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// None of the channels was known
    Unknown,
    /// Channels removed, the call still has live ones
    Remaining { call_id: String, channels: usize },
    /// The call's last channel is gone
    Ended { call_id: String },
}

#[derive(Debug, Default)]
pub struct ChannelTracker {
    channel_to_call: HashMap<String, String>,
    call_channels: HashMap<String, HashSet<String>>,
    inbound_calls: HashSet<String>,
}

impl ChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `channels` to `call_id`
    pub fn track<'a, I>(&mut self, call_id: &str, channels: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        if call_id.is_empty() {
            return;
        }

        for channel in channels {
            if let Some(previous) = self
                .channel_to_call
                .insert(channel.clone(), call_id.to_string())
            {
                if previous != call_id {
                    self.detach(&previous, channel);
                }
            }
            self.call_channels
                .entry(call_id.to_string())
                .or_default()
                .insert(channel.clone());
        }
    }

    /// Call a set of channels belongs to; a non-empty `linkedid` wins over
    /// the channel map
    pub fn resolve(&self, linkedid: Option<&str>, channels: &[String]) -> Option<String> {
        if let Some(linkedid) = linkedid.filter(|l| !l.is_empty()) {
            return Some(linkedid.to_string());
        }

        channels
            .iter()
            .find_map(|channel| self.channel_to_call.get(channel))
            .cloned()
    }

    /// Forget `channels`; the call they belonged to ends once it has none left
    pub fn release(&mut self, channels: &[String]) -> Release {
        let Some(call_id) = self.resolve(None, channels) else {
            return Release::Unknown;
        };

        for channel in channels {
            if let Some(owner) = self.channel_to_call.remove(channel) {
                if owner != call_id {
                    self.detach(&owner, channel);
                }
            }
        }

        let remaining = match self.call_channels.get_mut(&call_id) {
            Some(live) => {
                for channel in channels {
                    live.remove(channel);
                }
                live.len()
            }
            None => 0,
        };

        if remaining > 0 {
            return Release::Remaining {
                call_id,
                channels: remaining,
            };
        }

        self.call_channels.remove(&call_id);
        self.inbound_calls.remove(&call_id);
        Release::Ended { call_id }
    }

    /// Flag a call as coming in from an external trunk
    pub fn mark_inbound(&mut self, call_id: &str) {
        if !call_id.is_empty() {
            self.inbound_calls.insert(call_id.to_string());
        }
    }

    pub fn is_inbound(&self, call_id: &str) -> bool {
        self.inbound_calls.contains(call_id)
    }

    pub fn channel_count(&self, call_id: &str) -> usize {
        self.call_channels.get(call_id).map_or(0, HashSet::len)
    }

    pub fn is_empty(&self) -> bool {
        self.channel_to_call.is_empty() && self.call_channels.is_empty() && self.inbound_calls.is_empty()
    }

    pub fn clear(&mut self) {
        self.channel_to_call.clear();
        self.call_channels.clear();
        self.inbound_calls.clear();
    }

    fn detach(&mut self, call_id: &str, channel: &str) {
        if let Some(live) = self.call_channels.get_mut(call_id) {
            live.remove(channel);
            if live.is_empty() {
                self.call_channels.remove(call_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chans(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_call_ends_with_its_last_channel() {
        let mut tracker = ChannelTracker::new();
        tracker.track("L1", &chans(&["PJSIP/trunk-01"]));
        tracker.track("L1", &chans(&["PJSIP/1001-02", "PJSIP/1002-03"]));
        assert_eq!(tracker.channel_count("L1"), 3);

        assert_eq!(
            tracker.release(&chans(&["PJSIP/1002-03"])),
            Release::Remaining {
                call_id: "L1".to_string(),
                channels: 2
            }
        );
        assert_eq!(
            tracker.release(&chans(&["PJSIP/1001-02", "PJSIP/trunk-01"])),
            Release::Ended {
                call_id: "L1".to_string()
            }
        );
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_release_of_unknown_channel() {
        let mut tracker = ChannelTracker::new();
        tracker.track("L1", &chans(&["PJSIP/1001-02"]));

        assert_eq!(tracker.release(&chans(&["PJSIP/9999-09"])), Release::Unknown);
        assert_eq!(tracker.channel_count("L1"), 1);
    }

    #[test]
    fn test_resolve_prefers_linkedid() {
        let mut tracker = ChannelTracker::new();
        tracker.track("L1", &chans(&["PJSIP/1001-02"]));

        let bridge = chans(&["PJSIP/trunk-01", "PJSIP/1001-02"]);
        assert_eq!(tracker.resolve(Some(""), &bridge), Some("L1".to_string()));
        assert_eq!(tracker.resolve(None, &bridge), Some("L1".to_string()));
        assert_eq!(tracker.resolve(Some("L7"), &bridge), Some("L7".to_string()));
        assert_eq!(tracker.resolve(None, &chans(&["PJSIP/x"])), None);
    }

    #[test]
    fn test_inbound_flag_is_dropped_when_call_ends() {
        let mut tracker = ChannelTracker::new();
        tracker.mark_inbound("L1");
        tracker.mark_inbound("");
        tracker.track("L1", &chans(&["PJSIP/trunk-01"]));
        assert!(tracker.is_inbound("L1"));

        tracker.release(&chans(&["PJSIP/trunk-01"]));
        assert!(!tracker.is_inbound("L1"));
    }

    #[test]
    fn test_channel_moving_to_another_call() {
        let mut tracker = ChannelTracker::new();
        tracker.track("L1", &chans(&["PJSIP/1001-02"]));
        tracker.track("L2", &chans(&["PJSIP/1001-02"]));

        assert_eq!(tracker.channel_count("L1"), 0);
        assert_eq!(tracker.channel_count("L2"), 1);
    }

    #[test]
    fn test_clear() {
        let mut tracker = ChannelTracker::new();
        tracker.mark_inbound("L1");
        tracker.track("L1", &chans(&["PJSIP/trunk-01"]));

        tracker.clear();
        assert!(tracker.is_empty());
    }
}
