//! Folds decoded PBX notifications into the call table and publishes the
//! resulting domain events.
//!
//! Vendor channel entries (`chantype` set) follow the PBX's own model:
//!
//! - an `unbridge` ring on a leg with `inbound_trunk_name` marks its call as
//!   external; only such calls are announced, internal and outbound calls
//!   never produce `call_ring`
//! - `unbridge` rings on extension legs of an external call create the record
//!   (caller in `connectednum`, rung extension in `callernum`); further legs
//!   of a ring group only extend its `extensions` list
//! - a `bridge` means answered; its call id is resolved through the channels
//!   already seen when the PBX leaves `linkedid` empty
//! - deletes release channels and the call hangs up with its last channel
//!
//! Entries without `chantype` describe a whole call at once and are applied
//! directly by state.

use crate::broadcaster::EventBroadcaster;
use crate::channels::{ChannelTracker, Release};
use crate::protocol::{CallPhase, CallStatusUpdate, ChannelEvent, ChannelKind, Notification};
use crate::store::{CallStateStore, ExtensionStatusTable};
use parking_lot::Mutex;
use rubrica_core::{CallRecord, CallState, DirectoryLookup, DomainEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

pub struct Reconciler {
    store: Arc<CallStateStore>,
    extensions: Arc<ExtensionStatusTable>,
    broadcaster: EventBroadcaster,
    directory: Arc<dyn DirectoryLookup>,
    lookup_timeout: Duration,
    channels: Mutex<ChannelTracker>,
}

impl Reconciler {
    pub fn new(
        store: Arc<CallStateStore>,
        extensions: Arc<ExtensionStatusTable>,
        broadcaster: EventBroadcaster,
        directory: Arc<dyn DirectoryLookup>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            extensions,
            broadcaster,
            directory,
            lookup_timeout,
            channels: Mutex::new(ChannelTracker::new()),
        }
    }

    pub fn store(&self) -> &Arc<CallStateStore> {
        &self.store
    }

    pub fn extensions(&self) -> &Arc<ExtensionStatusTable> {
        &self.extensions
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub async fn apply(&self, notification: Notification) {
        match notification {
            Notification::CallStatus(update) => self.apply_call(update).await,
            Notification::Channel(event) => match (event.kind, event.deleted) {
                (_, true) => self.release_channels(&event.channels),
                (ChannelKind::Unbridge, false) => self.apply_unbridge(event).await,
                (ChannelKind::Bridge, false) => self.apply_bridge(event).await,
            },
            Notification::ExtensionStatus { extension, status } => {
                info!(extension = %extension, status = %status, "Extension status");
                self.extensions.set(&extension, &status);
                self.broadcaster
                    .publish(DomainEvent::ExtensionStatus { extension, status });
            }
        }
    }

    async fn apply_call(&self, update: CallStatusUpdate) {
        match update.phase {
            CallPhase::Ringing => {
                if self.store.contains(&update.unique_id) {
                    debug!(uniqueid = %update.unique_id, "Call already tracked, ring ignored");
                    return;
                }

                let record = self.new_record(&update, CallState::Ringing).await;
                if !self.store.insert(record.clone()) {
                    return;
                }

                info!(
                    uniqueid = %record.unique_id,
                    from = %record.callerid1,
                    to = %record.callerid2,
                    "Call ringing"
                );
                self.broadcaster.publish(DomainEvent::CallRing(record));
            }

            CallPhase::Connected => {
                let updated = self.store.update(&update.unique_id, |record| {
                    record.state = CallState::Connected;
                    if record.callerid1.is_empty() {
                        record.callerid1 = update.callerid1.clone();
                    }
                    if record.callerid2.is_empty() {
                        record.callerid2 = update.callerid2.clone();
                    }
                });

                let record = match updated {
                    Some(record) => record,
                    None => {
                        debug!(uniqueid = %update.unique_id, "Connected call not tracked, synthesizing");
                        let record = self.new_record(&update, CallState::Connected).await;
                        self.store.insert(record.clone());
                        record
                    }
                };

                info!(uniqueid = %record.unique_id, "Call connected");
                self.broadcaster.publish(DomainEvent::CallConnect(record));
            }

            CallPhase::Hangup => self.hang_up(&update.unique_id),
        }
    }

    async fn apply_unbridge(&self, event: ChannelEvent) {
        let call_id = event.announced_call_id();

        let inbound = {
            let mut channels = self.channels.lock();
            channels.track(&call_id, &event.channels);

            if !event.is_ringing() {
                debug!(state = %event.state, "Unbridge entry not ringing, ignored");
                return;
            }
            if event.is_inbound_trunk_leg() {
                channels.mark_inbound(&call_id);
                debug!(linkedid = %call_id, "Inbound trunk leg, call marked external");
                return;
            }
            !call_id.is_empty() && channels.is_inbound(&call_id)
        };

        if !inbound {
            debug!(linkedid = %call_id, "Ringing leg of an internal or outbound call, ignored");
            return;
        }

        // extension legs see the call from the callee side
        let extension = event.callernum;
        let caller = event.connectednum;

        let mut added = false;
        let known = self.store.update(&call_id, |record| {
            if record.state == CallState::Ringing {
                added = record.add_extension(extension.as_str());
            }
        });
        if known.is_some() {
            if added {
                info!(linkedid = %call_id, extension = %extension, "Ring group extension added");
            }
            return;
        }

        let (name1, name2) = tokio::join!(self.resolve(&caller), self.resolve(&extension));
        let name1 = name1.or_else(|| Some(event.connectedname).filter(|n| !n.is_empty()));
        let record = CallRecord::new(call_id, CallState::Ringing, caller, extension.as_str())
            .with_names(name1, name2)
            .with_extension(extension.as_str());

        if !self.store.insert(record.clone()) {
            return;
        }

        info!(
            linkedid = %record.unique_id,
            from = %record.callerid1,
            to = %record.callerid2,
            "Incoming call ringing"
        );
        self.broadcaster.publish(DomainEvent::CallRing(record));
    }

    async fn apply_bridge(&self, event: ChannelEvent) {
        let resolved = {
            let mut channels = self.channels.lock();
            let call_id = channels
                .resolve(event.linkedid.as_deref(), &event.channels)
                .or_else(|| {
                    // answered outbound calls have no earlier ringing leg
                    event.outbound_trunk.as_ref().and_then(|_| {
                        Some(event.uniqueid.clone())
                            .filter(|u| !u.is_empty())
                            .or_else(|| event.channels.first().cloned())
                    })
                });

            call_id.map(|call_id| {
                channels.track(&call_id, &event.channels);
                if event.is_inbound_trunk_leg() {
                    channels.mark_inbound(&call_id);
                }
                let inbound = channels.is_inbound(&call_id);
                (call_id, inbound)
            })
        };

        let Some((call_id, inbound)) = resolved else {
            debug!(channels = ?event.channels, "Bridge for unknown channels, ignored");
            return;
        };
        if !inbound {
            debug!(linkedid = %call_id, "Bridge of an internal or outbound call, ignored");
            return;
        }

        let bridged = CallStatusUpdate {
            unique_id: call_id,
            phase: CallPhase::Connected,
            callerid1: event.callerid1,
            callerid2: event.callerid2,
        };
        let names = (
            Some(event.name1).filter(|n| !n.is_empty()),
            Some(event.name2).filter(|n| !n.is_empty()),
        );

        let updated = self.store.update(&bridged.unique_id, |record| {
            record.state = CallState::Connected;
            if !bridged.callerid1.is_empty() && bridged.callerid1 != record.callerid1 {
                record.callerid1 = bridged.callerid1.clone();
                record.name1 = None;
            }
            if !bridged.callerid2.is_empty() && bridged.callerid2 != record.callerid2 {
                record.callerid2 = bridged.callerid2.clone();
                record.name2 = None;
            }
            if names.0.is_some() {
                record.name1 = names.0.clone();
            }
            if names.1.is_some() {
                record.name2 = names.1.clone();
            }
        });

        let record = match updated {
            Some(record) => self.fill_names(record).await,
            None => {
                debug!(linkedid = %bridged.unique_id, "Answered call not tracked, synthesizing");
                let mut record = self.new_record(&bridged, CallState::Connected).await;
                if names.0.is_some() {
                    record.name1 = names.0;
                }
                if names.1.is_some() {
                    record.name2 = names.1;
                }
                self.store.insert(record.clone());
                record
            }
        };

        info!(linkedid = %record.unique_id, "Incoming call answered");
        self.broadcaster.publish(DomainEvent::CallConnect(record));
    }

    /// Resolve the names still missing after a bridge changed the numbers
    async fn fill_names(&self, mut record: CallRecord) -> CallRecord {
        let (name1, name2) = tokio::join!(
            self.resolve_unless_named(record.name1.as_deref(), &record.callerid1),
            self.resolve_unless_named(record.name2.as_deref(), &record.callerid2)
        );
        if name1 == record.name1 && name2 == record.name2 {
            return record;
        }

        record.name1 = name1;
        record.name2 = name2;
        let id = record.unique_id.clone();
        let names = (record.name1.clone(), record.name2.clone());
        self.store
            .update(&id, |stored| {
                stored.name1 = names.0;
                stored.name2 = names.1;
            })
            .unwrap_or(record)
    }

    async fn resolve_unless_named(&self, name: Option<&str>, number: &str) -> Option<String> {
        match name {
            Some(name) => Some(name.to_string()),
            None => self.resolve(number).await,
        }
    }

    fn release_channels(&self, channels: &[String]) {
        let release = self.channels.lock().release(channels);

        match release {
            Release::Ended { call_id } => self.hang_up(&call_id),
            Release::Remaining { call_id, channels } => {
                debug!(linkedid = %call_id, remaining = channels, "Channel released, call continues");
            }
            Release::Unknown => {
                debug!(channels = ?channels, "Delete for untracked channels ignored");
            }
        }
    }

    fn hang_up(&self, call_id: &str) {
        match self.store.get(call_id) {
            Some(record) => {
                info!(uniqueid = %record.unique_id, "Call ended");
                self.broadcaster.publish(DomainEvent::CallHangup(record));
                self.store.remove(call_id);
            }
            None => {
                debug!(uniqueid = %call_id, "Hangup for unknown call ignored");
            }
        }
    }

    async fn new_record(&self, update: &CallStatusUpdate, state: CallState) -> CallRecord {
        let (name1, name2) = tokio::join!(
            self.resolve(&update.callerid1),
            self.resolve(&update.callerid2)
        );

        CallRecord::new(
            update.unique_id.clone(),
            state,
            update.callerid1.clone(),
            update.callerid2.clone(),
        )
        .with_names(name1, name2)
    }

    /// Best-effort directory lookup; misses, errors and timeouts are `None`
    async fn resolve(&self, number: &str) -> Option<String> {
        if number.is_empty() {
            return None;
        }

        match timeout(self.lookup_timeout, self.directory.lookup(number)).await {
            Ok(Ok(name)) => name,
            Ok(Err(e)) => {
                warn!(number = %number, "Directory lookup failed: {}", e);
                None
            }
            Err(_) => {
                warn!(number = %number, "Directory lookup timed out");
                None
            }
        }
    }

    /// Forget every call and extension status; used when the PBX session is
    /// lost and the tables can no longer be trusted
    pub fn reset(&self) {
        let dropped = self.store.clear();
        self.extensions.clear();
        self.channels.lock().clear();
        if dropped > 0 {
            info!(calls = dropped, "Active call table cleared");
        }
    }
}
