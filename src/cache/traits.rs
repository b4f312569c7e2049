//! Core types for the response cache.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::signature::Signature;
use crate::error::SyncError;

/// Coarse invalidation category grouping cache entries (e.g. `Cart`).
///
/// A tag carries no payload; it only exists so related entries can be
/// invalidated together.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Cow<'static, str>);

impl Tag {
  pub const fn new(name: &'static str) -> Self {
    Self(Cow::Borrowed(name))
  }

  pub fn owned(name: impl Into<String>) -> Self {
    Self(Cow::Owned(name.into()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Tag({})", self.0)
  }
}

impl fmt::Display for Tag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
  /// A fetch is in flight
  Pending,
  /// The last fetch succeeded
  Fulfilled,
  /// The last fetch failed
  Failed,
}

/// A cached response.
///
/// Entries are immutable values shared behind `Arc`: every transition
/// produces a new entry that replaces the old one under the same signature.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub signature: Signature,
  /// Last successfully fetched payload. Kept through pending and failed
  /// transitions so consumers can keep showing last-known-good data.
  pub payload: Option<Arc<Value>>,
  pub tags: BTreeSet<Tag>,
  /// When `payload` was fetched
  pub fetched_at: Option<DateTime<Utc>>,
  pub status: EntryStatus,
  /// Set by invalidation; a stale entry is never served as a cache hit
  pub stale: bool,
  /// Error of the last failed fetch
  pub error: Option<SyncError>,
}

impl CacheEntry {
  pub(crate) fn pending(signature: Signature) -> Self {
    Self {
      signature,
      payload: None,
      tags: BTreeSet::new(),
      fetched_at: None,
      status: EntryStatus::Pending,
      stale: false,
      error: None,
    }
  }

  /// Whether this entry may be served without a network call.
  pub fn is_fresh(&self, now: DateTime<Utc>, stale_after: Option<Duration>) -> bool {
    if self.status != EntryStatus::Fulfilled || self.stale || self.payload.is_none() {
      return false;
    }
    match (stale_after, self.fetched_at) {
      (Some(limit), Some(fetched_at)) => now - fetched_at <= limit,
      _ => true,
    }
  }

  /// Decode the payload into a typed value.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, SyncError> {
    self
      .payload
      .as_deref()
      .map(|v| T::deserialize(v).map_err(SyncError::from))
      .transpose()
  }
}

/// Result of a query, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was fetched
  pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T, fetched_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      fetched_at,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, fetched_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      fetched_at,
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      fetched_at: self.fetched_at,
    }
  }
}

impl CacheResult<Arc<Value>> {
  /// Decode the raw payload into a typed value.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<CacheResult<T>, SyncError> {
    let data = T::deserialize(self.data.as_ref())?;
    Ok(CacheResult {
      data,
      source: self.source,
      fetched_at: self.fetched_at,
    })
  }
}

/// Indicates where a query result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fetched from the network by this call or an in-flight call it joined
  Network,
  /// Served from a fresh cache entry without a network call
  Cache,
}

/// Notification delivered to subscribers of a signature.
#[derive(Debug, Clone)]
pub enum CacheEvent {
  /// A fetch succeeded and replaced the entry
  Fulfilled(Arc<CacheEntry>),
  /// A fetch failed; the entry still carries the last-known-good payload
  Failed(Arc<CacheEntry>),
  /// The entry was marked stale; mounted consumers should query again
  Invalidated(Arc<CacheEntry>),
  /// The entry was removed by eviction or a store reset
  Cleared(Signature),
}

impl CacheEvent {
  pub fn signature(&self) -> &Signature {
    match self {
      CacheEvent::Fulfilled(e) | CacheEvent::Failed(e) | CacheEvent::Invalidated(e) => &e.signature,
      CacheEvent::Cleared(s) => s,
    }
  }
}
