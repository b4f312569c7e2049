//! Query and mutation engine over the shared cache store.
//!
//! The engine is an explicitly owned object: construct it once per session,
//! clone it (cheaply) into every consumer, and call [`SyncEngine::clear`] at
//! session boundaries such as logout.

mod mutation;
mod query;
mod subscriptions;

pub use query::QueryOutput;
pub use subscriptions::{Callback, Subscription, SubscriptionRegistry};

use chrono::Duration;
use futures::future::{BoxFuture, Shared};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::{AlwaysAuthenticated, AuthState};
use crate::cache::{CacheEntry, CacheEvent, CacheStore, Signature, Tag};
use crate::error::SyncError;
use crate::fetcher::{Fetcher, Request};

/// A read: the request plus the tags its response provides.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
  pub request: Request,
  pub provides: BTreeSet<Tag>,
  /// Skip the query entirely while the session is anonymous
  pub requires_auth: bool,
}

impl QueryDescriptor {
  pub fn new(request: Request) -> Self {
    Self {
      request,
      provides: BTreeSet::new(),
      requires_auth: false,
    }
  }

  pub fn provides(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
    self.provides.extend(tags);
    self
  }

  pub fn authenticated(mut self) -> Self {
    self.requires_auth = true;
    self
  }

  pub fn signature(&self) -> Signature {
    Signature::of(&self.request)
  }
}

/// A write: the request plus the tags it invalidates on success.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationDescriptor {
  pub request: Request,
  pub invalidates: BTreeSet<Tag>,
}

impl MutationDescriptor {
  pub fn new(request: Request) -> Self {
    Self {
      request,
      invalidates: BTreeSet::new(),
    }
  }

  pub fn invalidates(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
    self.invalidates.extend(tags);
    self
  }
}

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, SyncError>>>;

/// A fetch shared by every caller of one signature.
struct InFlight {
  fetch: SharedFetch,
  provides: BTreeSet<Tag>,
  /// Monotonic per engine; orders fetches of the same signature
  id: u64,
}

/// Store plus in-flight table, guarded together so that "check cache, else
/// join or start a fetch" is one atomic step.
#[derive(Default)]
struct EngineState {
  store: CacheStore,
  in_flight: HashMap<Signature, InFlight>,
  /// Id of the fetch whose response last landed in the store, per signature
  written: HashMap<Signature, u64>,
  next_fetch: u64,
}

struct Inner {
  fetcher: Arc<dyn Fetcher>,
  auth: Arc<dyn AuthState>,
  stale_after: Option<Duration>,
  state: Mutex<EngineState>,
  subscriptions: SubscriptionRegistry,
}

/// Shared handle to the cache, the fetcher and the subscription registry.
#[derive(Clone)]
pub struct SyncEngine {
  inner: Arc<Inner>,
}

impl SyncEngine {
  /// Engine with an always-authenticated session and no stale time.
  pub fn new(fetcher: impl Fetcher) -> Self {
    Self::builder(fetcher).build()
  }

  pub fn builder(fetcher: impl Fetcher) -> SyncEngineBuilder {
    SyncEngineBuilder {
      fetcher: Arc::new(fetcher),
      auth: Arc::new(AlwaysAuthenticated),
      stale_after: None,
    }
  }

  /// Register `callback` for every update of `signature`.
  pub fn subscribe(&self, signature: Signature, callback: Callback) -> Subscription {
    self.inner.subscriptions.subscribe(signature, callback)
  }

  pub fn subscriptions(&self) -> &SubscriptionRegistry {
    &self.inner.subscriptions
  }

  /// Current entry for `signature`, fresh or not.
  pub fn entry(&self, signature: &Signature) -> Option<Arc<CacheEntry>> {
    self.state().store.get(signature)
  }

  /// Number of cached entries.
  pub fn cached_len(&self) -> usize {
    self.state().store.len()
  }

  /// Mark every entry tagged with any of `tags` stale and notify subscribers.
  ///
  /// Fetches still in flight for those tags are detached: later queries start
  /// a fresh fetch instead of joining them, and their own response is stored
  /// already stale unless something newer has landed first.
  pub fn invalidate_tags(&self, tags: &BTreeSet<Tag>) -> usize {
    let (invalidated, detached) = {
      let mut state = self.state();
      let before = state.in_flight.len();
      state
        .in_flight
        .retain(|_, in_flight| in_flight.provides.is_disjoint(tags));
      let detached = before - state.in_flight.len();
      let targets = state.store.entries_for_tags(tags.iter());
      (state.store.invalidate(&targets), detached)
    };

    let count = invalidated.len();
    if count > 0 || detached > 0 {
      tracing::info!(tags = ?tags, entries = count, detached, "invalidated cache entries");
    }
    for entry in invalidated {
      self.notify(&CacheEvent::Invalidated(entry));
    }
    count
  }

  /// Remove one entry and notify its subscribers.
  pub fn evict(&self, signature: &Signature) -> bool {
    let removed = self.state().store.evict(signature).is_some();
    if removed {
      self.notify(&CacheEvent::Cleared(signature.clone()));
    }
    removed
  }

  /// Drop every entry (logout). Responses of fetches already in flight are
  /// discarded when they arrive.
  pub fn clear(&self) {
    let cleared = {
      let mut state = self.state();
      state.in_flight.clear();
      state.written.clear();
      state.store.clear()
    };

    tracing::info!(entries = cleared.len(), "cache cleared");
    for signature in cleared {
      self.notify(&CacheEvent::Cleared(signature));
    }
  }

  fn notify(&self, event: &CacheEvent) {
    self.inner.subscriptions.notify(event);
  }

  fn state(&self) -> MutexGuard<'_, EngineState> {
    self
      .inner
      .state
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

/// Builder for [`SyncEngine`].
pub struct SyncEngineBuilder {
  fetcher: Arc<dyn Fetcher>,
  auth: Arc<dyn AuthState>,
  stale_after: Option<Duration>,
}

impl SyncEngineBuilder {
  /// Consult `auth` before running queries that require a session.
  pub fn auth(mut self, auth: Arc<dyn AuthState>) -> Self {
    self.auth = auth;
    self
  }

  /// Treat fulfilled entries older than `stale_after` as stale.
  pub fn stale_after(mut self, stale_after: Option<Duration>) -> Self {
    self.stale_after = stale_after;
    self
  }

  pub fn build(self) -> SyncEngine {
    SyncEngine {
      inner: Arc::new(Inner {
        fetcher: self.fetcher,
        auth: self.auth,
        stale_after: self.stale_after,
        state: Mutex::new(EngineState::default()),
        subscriptions: SubscriptionRegistry::new(),
      }),
    }
  }
}
