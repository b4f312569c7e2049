//! In-memory cache store and its tag index.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use super::signature::Signature;
use super::tags::TagIndex;
use super::traits::{CacheEntry, EntryStatus, Tag};
use crate::error::SyncError;

/// Cached responses keyed by signature, plus the tag index over them.
///
/// Every method updates the entries and the index together, so no tag ever
/// points at a signature without an entry. Entries are replaced, never patched.
#[derive(Debug, Default)]
pub struct CacheStore {
  entries: HashMap<Signature, Arc<CacheEntry>>,
  index: TagIndex,
  /// Advanced by `clear()`; fetches begun under an older epoch are discarded.
  epoch: u64,
}

impl CacheStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, signature: &Signature) -> Option<Arc<CacheEntry>> {
    self.entries.get(signature).cloned()
  }

  /// Mark `signature` as pending, keeping any previous payload visible.
  pub fn begin(&mut self, signature: &Signature) -> Arc<CacheEntry> {
    let entry = match self.entries.get(signature) {
      Some(existing) => CacheEntry {
        status: EntryStatus::Pending,
        ..CacheEntry::clone(existing)
      },
      None => CacheEntry::pending(signature.clone()),
    };
    self.replace(entry)
  }

  /// Store a fulfilled payload under `tags`.
  pub fn put(&mut self, signature: &Signature, payload: Value, tags: BTreeSet<Tag>) -> Arc<CacheEntry> {
    self.put_at(signature, payload, tags, Utc::now())
  }

  pub(crate) fn put_at(
    &mut self,
    signature: &Signature,
    payload: Value,
    tags: BTreeSet<Tag>,
    fetched_at: DateTime<Utc>,
  ) -> Arc<CacheEntry> {
    self.index.tag(signature, &tags);
    self.replace(CacheEntry {
      signature: signature.clone(),
      payload: Some(Arc::new(payload)),
      tags,
      fetched_at: Some(fetched_at),
      status: EntryStatus::Fulfilled,
      stale: false,
      error: None,
    })
  }

  /// Record a failed fetch. The last fulfilled payload and its tags stay.
  pub fn fail(&mut self, signature: &Signature, error: SyncError) -> Arc<CacheEntry> {
    let entry = match self.entries.get(signature) {
      Some(existing) => CacheEntry {
        status: EntryStatus::Failed,
        error: Some(error),
        ..CacheEntry::clone(existing)
      },
      None => CacheEntry {
        status: EntryStatus::Failed,
        error: Some(error),
        ..CacheEntry::pending(signature.clone())
      },
    };
    self.replace(entry)
  }

  /// Mark entries stale. Returns the entries that were present.
  pub fn invalidate(&mut self, signatures: &BTreeSet<Signature>) -> Vec<Arc<CacheEntry>> {
    let mut invalidated = Vec::new();
    for signature in signatures {
      if let Some(existing) = self.entries.get(signature) {
        let entry = CacheEntry {
          stale: true,
          ..CacheEntry::clone(existing)
        };
        invalidated.push(self.replace(entry));
      }
    }
    invalidated
  }

  /// Mark a single entry stale without going through the tag index.
  pub(crate) fn mark_stale(&mut self, signature: &Signature) -> Option<Arc<CacheEntry>> {
    let mut set = BTreeSet::new();
    set.insert(signature.clone());
    self.invalidate(&set).pop()
  }

  /// Every signature carrying at least one of `tags`.
  pub fn entries_for_tags<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> BTreeSet<Signature> {
    tags
      .into_iter()
      .flat_map(|tag| self.index.entries_for_tag(tag))
      .collect()
  }

  /// Remove one entry and its tag memberships.
  pub fn evict(&mut self, signature: &Signature) -> Option<Arc<CacheEntry>> {
    self.index.untag(signature);
    self.entries.remove(signature)
  }

  /// Drop everything (session boundary). Returns the removed signatures.
  pub fn clear(&mut self) -> Vec<Signature> {
    self.epoch += 1;
    self.index.clear();
    self.entries.drain().map(|(signature, _)| signature).collect()
  }

  pub fn epoch(&self) -> u64 {
    self.epoch
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn index(&self) -> &TagIndex {
    &self.index
  }

  fn replace(&mut self, entry: CacheEntry) -> Arc<CacheEntry> {
    let entry = Arc::new(entry);
    self
      .entries
      .insert(entry.signature.clone(), Arc::clone(&entry));
    entry
  }
}
