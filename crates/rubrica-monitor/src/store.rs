//! In-memory call and extension tables
//!
//! Both tables are written by the event client only and read by request
//! handlers. Writers replace or mutate records under the write lock, so a
//! reader taking a snapshot never sees a half-updated record.

use parking_lot::RwLock;
use rubrica_core::CallRecord;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct CallTable {
    next_seq: u64,
    calls: HashMap<String, (u64, CallRecord)>,
}

/// Table of currently active calls keyed by unique id
#[derive(Default)]
pub struct CallStateStore {
    inner: RwLock<CallTable>,
}

impl CallStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record; returns false and leaves the table unchanged when
    /// the id is already present
    pub fn insert(&self, record: CallRecord) -> bool {
        let mut table = self.inner.write();
        if table.calls.contains_key(&record.unique_id) {
            return false;
        }

        table.next_seq += 1;
        let seq = table.next_seq;
        table.calls.insert(record.unique_id.clone(), (seq, record));
        true
    }

    /// Mutate a record in place and return the updated snapshot
    pub fn update<F>(&self, unique_id: &str, f: F) -> Option<CallRecord>
    where
        F: FnOnce(&mut CallRecord),
    {
        let mut table = self.inner.write();
        let (_, record) = table.calls.get_mut(unique_id)?;
        f(record);
        Some(record.clone())
    }

    pub fn remove(&self, unique_id: &str) -> Option<CallRecord> {
        self.inner.write().calls.remove(unique_id).map(|(_, record)| record)
    }

    pub fn get(&self, unique_id: &str) -> Option<CallRecord> {
        self.inner
            .read()
            .calls
            .get(unique_id)
            .map(|(_, record)| record.clone())
    }

    pub fn contains(&self, unique_id: &str) -> bool {
        self.inner.read().calls.contains_key(unique_id)
    }

    /// Point-in-time copy of every active call, oldest first
    pub fn snapshot(&self) -> Vec<CallRecord> {
        let table = self.inner.read();
        let mut entries: Vec<&(u64, CallRecord)> = table.calls.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, record)| record.clone()).collect()
    }

    /// Drop every record, returning how many were removed
    pub fn clear(&self) -> usize {
        let mut table = self.inner.write();
        let removed = table.calls.len();
        table.calls.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Last reported status of each extension
#[derive(Default)]
pub struct ExtensionStatusTable {
    inner: RwLock<BTreeMap<String, String>>,
}

impl ExtensionStatusTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, extension: &str, status: &str) {
        self.inner
            .write()
            .insert(extension.to_string(), status.to_string());
    }

    pub fn get(&self, extension: &str) -> Option<String> {
        self.inner.read().get(extension).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.read().clone()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
