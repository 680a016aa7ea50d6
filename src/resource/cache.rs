//! Resolution cache
//!
//! One cache lives for exactly one resolution run. Every id the run touches
//! gets a slot, first [`CacheEntry::Pending`] while its query is in flight,
//! then [`CacheEntry::Resolved`]. A missing key is the third state.

use serde_json::{Map, Value};
use std::collections::HashMap;

/// A cache slot
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// Query in flight, document not yet available
    Pending,
    /// Raw document as returned by the query (empty object when not found)
    Resolved(Value),
}

/// Borrowed view of the state of one id
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EntryState<'a> {
    Absent,
    Pending,
    Resolved(&'a Value),
}

/// Marker handed out when a slot is claimed
///
/// Holding a `PendingRef` is the only way to fulfil a slot, so a slot can
/// never be claimed twice or silently overwritten.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingRef {
    id: String,
}

impl PendingRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Follow the marker: the resolved document once the slot is fulfilled,
    /// `None` while the query is still in flight
    pub fn get<'a>(&self, cache: &'a ResolutionCache) -> Option<&'a Value> {
        cache.get(&self.id)
    }
}

/// Id → document table shared by every step of one resolution run
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> EntryState<'_> {
        match self.entries.get(id) {
            None => EntryState::Absent,
            Some(CacheEntry::Pending) => EntryState::Pending,
            Some(CacheEntry::Resolved(doc)) => EntryState::Resolved(doc),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Resolved document for an id, if any
    pub fn get(&self, id: &str) -> Option<&Value> {
        match self.entries.get(id) {
            Some(CacheEntry::Resolved(doc)) => Some(doc),
            _ => None,
        }
    }

    /// Claim the slot for `id`. Returns `None` when the id is already
    /// pending or resolved, which is what breaks reference cycles.
    pub fn claim(&mut self, id: &str) -> Option<PendingRef> {
        if self.contains(id) {
            tracing::debug!("Cache hit for id: {}", id);
            return None;
        }
        tracing::debug!("Marking id as pending: {}", id);
        self.entries.insert(id.to_string(), CacheEntry::Pending);
        Some(PendingRef { id: id.to_string() })
    }

    /// Store the fetched document for a claimed slot
    pub fn fulfil(&mut self, slot: PendingRef, doc: Value) {
        tracing::debug!("Adding document to cache for id: {}", slot.id);
        self.entries.insert(slot.id, CacheEntry::Resolved(doc));
    }

    /// Drop every slot still marked pending, so the ids can be claimed again
    /// after an aborted run. Returns the number of slots released.
    pub fn release_pending(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !matches!(entry, CacheEntry::Pending));
        before - self.entries.len()
    }

    /// Private, consumable copy of every resolved object, used by the merge pass
    pub fn working_copy(&self) -> HashMap<String, Map<String, Value>> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| match entry {
                CacheEntry::Resolved(Value::Object(fields)) => Some((id.clone(), fields.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
