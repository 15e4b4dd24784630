//! Mapping of VMs to the hosts they reside on.

use std::collections::BTreeMap;

use crate::core::snapshot::AllocationSnapshot;

/// Single source of truth about VM placement, keyed by VM unique key.
///
/// Supports one transaction at a time: [`AllocationTable::begin`] stores a snapshot, [`AllocationTable::rollback`]
/// brings back the entries it covers, [`AllocationTable::commit`] drops it.
#[derive(Clone, Debug, Default)]
pub struct AllocationTable {
    entries: BTreeMap<String, u32>,
    snapshot: Option<AllocationSnapshot>,
}

impl AllocationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vm_uid: &str) -> Option<u32> {
        self.entries.get(vm_uid).copied()
    }

    pub fn insert(&mut self, vm_uid: String, host_id: u32) {
        self.entries.insert(vm_uid, host_id);
    }

    pub fn remove(&mut self, vm_uid: &str) -> Option<u32> {
        self.entries.remove(vm_uid)
    }

    pub fn contains(&self, vm_uid: &str) -> bool {
        self.entries.contains_key(vm_uid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.entries.iter()
    }

    /// Starts a transaction. A snapshot left from the previous transaction is discarded.
    pub fn begin(&mut self, snapshot: AllocationSnapshot) {
        self.snapshot = Some(snapshot);
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn snapshot(&self) -> Option<&AllocationSnapshot> {
        self.snapshot.as_ref()
    }

    /// Ends the transaction keeping the current entries.
    pub fn commit(&mut self) {
        self.snapshot = None;
    }

    /// Ends the transaction replacing the entries of all VMs from the snapshot at once.
    /// Returns the snapshot so that the caller can replay it on hosts.
    pub fn rollback(&mut self) -> Option<AllocationSnapshot> {
        let snapshot = self.snapshot.take()?;
        let mut entries = self.entries.clone();
        for pair in snapshot.entries() {
            entries.insert(pair.vm_uid.clone(), pair.host_id);
        }
        self.entries = entries;
        Some(snapshot)
    }
}
