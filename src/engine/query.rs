//! Read path: cache hit, join an in-flight fetch, or start one.

use chrono::Utc;
use futures::FutureExt;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{InFlight, QueryDescriptor, SharedFetch, SyncEngine};
use crate::cache::{CacheEntry, CacheEvent, CacheResult, EntryStatus, Signature, Tag};
use crate::error::SyncError;

/// Outcome of a query: `None` when skipped for an anonymous session.
pub type QueryOutput = Result<Option<CacheResult<Arc<Value>>>, SyncError>;

impl SyncEngine {
  /// Fetch with cache-first strategy.
  ///
  /// 1. Skip if the descriptor requires a session and there is none
  /// 2. Fresh fulfilled entry: return it, no network call
  /// 3. Same signature already in flight: wait for that fetch
  /// 4. Otherwise mark pending, fetch, store under the declared tags
  ///
  /// Failures are reported to subscribers and returned; the last fulfilled
  /// payload stays in the cache.
  pub async fn query(&self, descriptor: &QueryDescriptor) -> QueryOutput {
    self.run_query(descriptor, false).await
  }

  /// Like [`query`](Self::query) but bypasses a fresh cache hit. Still joins
  /// a fetch already in flight.
  pub async fn refetch(&self, descriptor: &QueryDescriptor) -> QueryOutput {
    self.run_query(descriptor, true).await
  }

  async fn run_query(&self, descriptor: &QueryDescriptor, force: bool) -> QueryOutput {
    let signature = descriptor.signature();

    if descriptor.requires_auth && !self.inner.auth.is_authenticated() {
      tracing::debug!(signature = %signature, "skipping query for anonymous session");
      return Ok(None);
    }

    let fetch = {
      let mut state = self.state();

      if !force {
        if let Some(entry) = state.store.get(&signature) {
          if entry.is_fresh(Utc::now(), self.inner.stale_after) {
            tracing::debug!(signature = %signature, "cache hit");
            if let Some(payload) = &entry.payload {
              return Ok(Some(CacheResult::from_cache(
                Arc::clone(payload),
                entry.fetched_at,
              )));
            }
          }
        }
      }

      if let Some(in_flight) = state.in_flight.get(&signature) {
        tracing::debug!(signature = %signature, "joining in-flight fetch");
        in_flight.fetch.clone()
      } else {
        tracing::debug!(signature = %signature, "cache miss, fetching");
        let epoch = state.store.epoch();
        state.next_fetch += 1;
        let id = state.next_fetch;
        state.store.begin(&signature);
        let fetch = self.start_fetch(descriptor, signature.clone(), id, epoch);
        state.in_flight.insert(
          signature.clone(),
          InFlight {
            fetch: fetch.clone(),
            provides: descriptor.provides.clone(),
            id,
          },
        );
        fetch
      }
    };

    let entry = fetch.await?;
    match &entry.payload {
      Some(payload) => Ok(Some(CacheResult::from_network(
        Arc::clone(payload),
        entry.fetched_at,
      ))),
      None => Err(SyncError::Decode(format!(
        "fulfilled entry without payload for {}",
        signature
      ))),
    }
  }

  /// Build the shared fetch. The fetcher is invoked now; the response is
  /// settled into the store exactly once, by whichever waiter polls first.
  fn start_fetch(
    &self,
    descriptor: &QueryDescriptor,
    signature: Signature,
    id: u64,
    epoch: u64,
  ) -> SharedFetch {
    let engine = self.clone();
    let tags = descriptor.provides.clone();
    let response = self.inner.fetcher.execute(descriptor.request.clone());

    async move {
      let outcome = response.await;
      engine.settle(&signature, tags, id, epoch, outcome)
    }
    .boxed()
    .shared()
  }

  /// Apply a fetch outcome to the store, then notify subscribers.
  ///
  /// A fetch detached by invalidation is stored as stale, and only if no
  /// newer fetch for the signature is running or has already landed.
  fn settle(
    &self,
    signature: &Signature,
    tags: BTreeSet<Tag>,
    id: u64,
    epoch: u64,
    outcome: Result<Value, SyncError>,
  ) -> Result<Arc<CacheEntry>, SyncError> {
    let mut events = Vec::new();

    let result = {
      let mut state = self.state();

      if state.store.epoch() != epoch {
        tracing::warn!(signature = %signature, "discarding response begun before cache reset");
        return Err(SyncError::StaleResponse(signature.to_string()));
      }

      let attached = state.in_flight.get(signature).is_some_and(|f| f.id == id);
      if attached {
        state.in_flight.remove(signature);
      }
      let superseded = !attached
        && (state.in_flight.contains_key(signature)
          || state.written.get(signature).is_some_and(|&written| written > id));

      match outcome {
        Ok(payload) if superseded => {
          tracing::debug!(signature = %signature, "dropping response overtaken by a newer fetch");
          Ok(Arc::new(CacheEntry {
            signature: signature.clone(),
            payload: Some(Arc::new(payload)),
            tags,
            fetched_at: Some(Utc::now()),
            status: EntryStatus::Fulfilled,
            stale: true,
            error: None,
          }))
        }
        Ok(payload) => {
          state.written.insert(signature.clone(), id);
          let entry = state.store.put(signature, payload, tags);
          events.push(CacheEvent::Fulfilled(Arc::clone(&entry)));
          if attached {
            Ok(entry)
          } else {
            // Fetched before a mutation landed: keep it visible, but refetch
            tracing::debug!(signature = %signature, "response invalidated while in flight");
            match state.store.mark_stale(signature) {
              Some(stale) => {
                events.push(CacheEvent::Invalidated(Arc::clone(&stale)));
                Ok(stale)
              }
              None => Ok(entry),
            }
          }
        }
        Err(error) if superseded => Err(error),
        Err(error) => {
          tracing::warn!(signature = %signature, error = %error, "query failed");
          let entry = state.store.fail(signature, error.clone());
          events.push(CacheEvent::Failed(entry));
          Err(error)
        }
      }
    };

    for event in &events {
      self.notify(event);
    }
    result
  }
}
