//! Reverse index from invalidation tag to the signatures carrying it.

use std::collections::{BTreeSet, HashMap};

use super::signature::Signature;
use super::traits::Tag;

/// Tracks tag → signatures and signature → tags.
///
/// Only the cache store touches this index, inside the same mutation that
/// changes the entry, so the two never disagree.
#[derive(Debug, Default)]
pub struct TagIndex {
  by_tag: HashMap<Tag, BTreeSet<Signature>>,
  by_signature: HashMap<Signature, BTreeSet<Tag>>,
}

impl TagIndex {
  pub fn new() -> Self {
    Self::default()
  }

  /// Record that `signature` carries `tags`, replacing earlier memberships.
  pub fn tag(&mut self, signature: &Signature, tags: &BTreeSet<Tag>) {
    self.untag(signature);
    if tags.is_empty() {
      return;
    }
    for tag in tags {
      self
        .by_tag
        .entry(tag.clone())
        .or_default()
        .insert(signature.clone());
    }
    self.by_signature.insert(signature.clone(), tags.clone());
  }

  /// All signatures currently carrying `tag`.
  pub fn entries_for_tag(&self, tag: &Tag) -> BTreeSet<Signature> {
    self.by_tag.get(tag).cloned().unwrap_or_default()
  }

  /// Remove every membership of `signature`.
  pub fn untag(&mut self, signature: &Signature) {
    if let Some(tags) = self.by_signature.remove(signature) {
      for tag in tags {
        if let Some(signatures) = self.by_tag.get_mut(&tag) {
          signatures.remove(signature);
          if signatures.is_empty() {
            self.by_tag.remove(&tag);
          }
        }
      }
    }
  }

  pub fn clear(&mut self) {
    self.by_tag.clear();
    self.by_signature.clear();
  }

  /// Number of tags with at least one member.
  pub fn tag_count(&self) -> usize {
    self.by_tag.len()
  }
}
